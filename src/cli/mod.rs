//! CLI module for Flock
//!
//! Argument parsing for the `flock` binary.

use clap::Parser;
use std::path::PathBuf;

use flock::Request;

/// Flock - run deployment tasks on remote hosts over SSH
///
/// Tasks and hosts are declared in a Flockfile. Run a task with
/// `flock <task> [environment]`, or list tasks with `flock --print-tasks`.
#[derive(Parser, Debug, Clone)]
#[command(name = "flock")]
#[command(author = "Flock Contributors")]
#[command(version)]
#[command(about = "Run deployment tasks on remote hosts over SSH", long_about = None)]
pub struct Cli {
    /// Full name of the task to run (e.g. `deploy` or `db:migrate`)
    #[arg(required_unless_present = "print_tasks")]
    pub task: Option<String>,

    /// Environment to configure (default: production)
    pub environment: Option<String>,

    /// List the tasks of an environment (default: production) and exit
    #[arg(
        long,
        value_name = "ENVIRONMENT",
        num_args = 0..=1,
        conflicts_with_all = ["task", "environment"]
    )]
    pub print_tasks: Option<Option<String>>,

    /// Path to the Flockfile
    #[arg(short = 'f', long, env = "FLOCK_FLOCKFILE")]
    pub flockfile: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short = 'c', long, env = "FLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// What to do once configured
    pub fn request(&self) -> Request {
        match (&self.print_tasks, &self.task) {
            (None, Some(task)) => Request::Run(task.clone()),
            _ => Request::PrintTasks,
        }
    }

    /// Requested environment name
    pub fn environment_name(&self) -> Option<&str> {
        match &self.print_tasks {
            Some(environment) => environment.as_deref(),
            None => self.environment.as_deref(),
        }
    }
}
