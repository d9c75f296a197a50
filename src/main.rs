//! Flock - a remote deployment task runner
//!
//! This is the main entry point for the Flock CLI. It loads configuration
//! and the Flockfile, configures the selected environment and dispatches the
//! requested task.

mod cli;

use anyhow::Result;
use cli::Cli;
use flock::config::Config;
use flock::environment::Environment;
use flock::flockfile::Flockfile;
use flock::{output, Flock};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse_args();

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            output::error(&err.to_string());
            1
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_ref())?;

    init_logging(cli.verbosity(), &config.logging.level);
    debug!(version = VERSION, "Starting flock");

    output::set_colors(config.colors.enabled && !cli.no_color);

    let flockfile_path = cli
        .flockfile
        .clone()
        .unwrap_or_else(|| config.defaults.flockfile.clone());
    let flockfile = Flockfile::load(&flockfile_path)?.with_remote_user(config.remote_user());

    let mut flock = Flock::new(connector(&config)?).with_default_auth(config.default_auth());

    let environments = flockfile.environments();
    let candidates: Vec<&dyn Environment> = environments
        .iter()
        .map(|env| env as &dyn Environment)
        .collect();
    let requested = cli
        .environment_name()
        .unwrap_or(config.defaults.environment.as_str());

    flock.configure(&flockfile, &candidates, Some(requested))?;

    Ok(flock.run(&cli.request()))
}

#[cfg(feature = "ssh2-backend")]
fn connector(config: &Config) -> Result<flock::connection::SshConnector> {
    Ok(flock::connection::SshConnector::new(
        config.connection_config()?,
    ))
}

#[cfg(not(feature = "ssh2-backend"))]
fn connector(_config: &Config) -> Result<flock::connection::UnavailableConnector> {
    Ok(flock::connection::UnavailableConnector)
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, configured: &str) {
    let filter = match verbosity {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 3),
        )
        .with(env_filter)
        .init();
}
