//! Configuration module for Flock
//!
//! Handles loading and merging configuration from multiple sources, later
//! sources overriding earlier ones key by key:
//! - Default values
//! - System configuration (/etc/flock/flock.toml)
//! - User configuration (~/.flock.toml)
//! - Project configuration (./flock.toml)
//! - Environment variables
//! - Command-line arguments

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::config::{expand_path, ConnectionConfig, DEFAULT_TIMEOUT};
use crate::connection::{AuthMethod, PtyType};
use crate::environment::DEFAULT_ENVIRONMENT;

/// Default Flockfile name
pub const DEFAULT_FLOCKFILE: &str = "Flockfile.yml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// SSH settings
    pub ssh: SshConfig,

    /// Color settings
    pub colors: ColorsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Default settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Environment used when none is given on the command line
    pub environment: String,

    /// Path to the Flockfile
    pub flockfile: PathBuf,

    /// User for hosts declared without one
    pub remote_user: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            flockfile: PathBuf::from(DEFAULT_FLOCKFILE),
            remote_user: None,
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Connect timeout in seconds
    pub timeout: u64,

    /// Private key used for hosts declared without a credential
    pub identity_file: Option<PathBuf>,

    /// Passphrase for `identity_file`
    pub passphrase: Option<String>,

    /// Authenticate through the SSH agent when no identity file is set
    pub use_agent: bool,

    /// Request compression
    pub compression: bool,

    /// Initial pseudo-terminal mode (`none` disables it)
    pub pty: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            identity_file: None,
            passphrase: None,
            use_agent: false,
            compression: false,
            pty: PtyType::default().to_string(),
        }
    }
}

/// Colors configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colors
    pub enabled: bool,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when no `-v` flag or `RUST_LOG` is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Parse a pty setting: `none` or a terminal name
pub fn parse_pty(value: &str) -> Result<Option<PtyType>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let pty = value
        .parse::<PtyType>()
        .with_context(|| format!("Invalid pty setting '{}'", value))?;
    Ok(Some(pty))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut merged = Value::Object(Default::default());

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                merge_values(&mut merged, Self::read_file(&path)?);
            }
        }

        let mut config: Config =
            serde_json::from_value(merged).context("Invalid configuration")?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        // An explicit path replaces the search
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }
        if let Ok(env_config) = std::env::var("FLOCK_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = vec![PathBuf::from("/etc/flock/flock.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".flock.toml"));
            paths.push(home.join(".flock/flock.toml"));
        }

        paths.push(PathBuf::from("flock.toml"));
        paths.push(PathBuf::from(".flock.toml"));

        paths
    }

    /// Read one configuration file as a generic value.
    ///
    /// The file is checked against [`Config`] on its own so errors name it.
    fn read_file(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parse_error = || format!("Failed to parse config file: {}", path.display());

        let value: Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).with_context(parse_error)?,
            "json" => serde_json::from_str(&content).with_context(parse_error)?,
            _ => toml::from_str(&content).with_context(parse_error)?,
        };
        // An empty YAML document
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            value => value,
        };

        serde_json::from_value::<Config>(value.clone()).with_context(parse_error)?;
        Ok(value)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // FLOCK_ENVIRONMENT
        if let Ok(environment) = std::env::var("FLOCK_ENVIRONMENT") {
            self.defaults.environment = environment;
        }

        // FLOCK_FLOCKFILE
        if let Ok(path) = std::env::var("FLOCK_FLOCKFILE") {
            self.defaults.flockfile = PathBuf::from(path);
        }

        // FLOCK_REMOTE_USER
        if let Ok(user) = std::env::var("FLOCK_REMOTE_USER") {
            self.defaults.remote_user = Some(user);
        }

        // FLOCK_TIMEOUT
        if let Ok(timeout) = std::env::var("FLOCK_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.ssh.timeout = n;
            }
        }

        // FLOCK_PRIVATE_KEY_FILE
        if let Ok(file) = std::env::var("FLOCK_PRIVATE_KEY_FILE") {
            self.ssh.identity_file = Some(PathBuf::from(file));
        }

        // FLOCK_USE_AGENT
        if let Some(enabled) = std::env::var("FLOCK_USE_AGENT")
            .ok()
            .as_deref()
            .and_then(parse_bool)
        {
            self.ssh.use_agent = enabled;
        }

        // FLOCK_LOG_LEVEL
        if let Ok(level) = std::env::var("FLOCK_LOG_LEVEL") {
            self.logging.level = level;
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("FLOCK_NO_COLOR").is_ok() {
            self.colors.enabled = false;
        }
    }

    /// Credential used for hosts declared without one
    pub fn default_auth(&self) -> Option<AuthMethod> {
        if let Some(identity_file) = &self.ssh.identity_file {
            return Some(AuthMethod::Key {
                private_key: expand_path(&identity_file.to_string_lossy()),
                passphrase: self.ssh.passphrase.clone(),
            });
        }
        if self.ssh.use_agent {
            return Some(AuthMethod::Agent);
        }
        None
    }

    /// Session settings for the SSH connector
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig::new()
            .timeout(self.ssh.timeout)
            .compression(self.ssh.compression)
            .pty(parse_pty(&self.ssh.pty)?))
    }

    /// Get the effective remote user
    pub fn remote_user(&self) -> Option<&str> {
        self.defaults.remote_user.as_deref()
    }
}

/// Overlay `other` onto `base`: tables merge key by key, any other value
/// replaces what was there.
fn merge_values(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                merge_values(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, other) => *base = other,
    }
}
