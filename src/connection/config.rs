//! Connection configuration
//!
//! Settings shared by every SSH session opened during a run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PtyType;

/// Default connection timeout in seconds
pub const DEFAULT_TIMEOUT: u64 = 30;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Session-level settings for the SSH connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// TCP connect and handshake timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Request zlib compression from the server
    #[serde(default)]
    pub compression: bool,

    /// Pseudo-terminal requested by new connections (`None` disables it)
    #[serde(default = "default_pty")]
    pub pty: Option<PtyType>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_pty() -> Option<PtyType> {
    Some(PtyType::Vanilla)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            compression: false,
            pty: default_pty(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout in seconds
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set the initial pseudo-terminal mode
    pub fn pty(mut self, pty: Option<PtyType>) -> Self {
        self.pty = pty;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Helper to expand paths with ~ and environment variables
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or_else(|_| path.into());
    PathBuf::from(expanded.as_ref())
}

/// Get default identity files to try
pub fn default_identity_files() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    let ssh_dir = home.join(".ssh");

    vec![
        ssh_dir.join("id_ed25519"),
        ssh_dir.join("id_ecdsa"),
        ssh_dir.join("id_rsa"),
    ]
    .into_iter()
    .filter(|p| p.exists())
    .collect()
}
