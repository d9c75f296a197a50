//! Connection layer for remote host communication.
//!
//! This module defines the seam between Flock's execution core and the secure
//! shell library that actually talks to remote hosts.
//!
//! # Overview
//!
//! - A [`Connector`] opens an authenticated [`Transport`] for one host address.
//! - A [`Transport`] runs fully composed command lines and reports exit
//!   statuses. It knows nothing about directories or roles: composing the
//!   command context is the job of [`HostConnection`](crate::server::HostConnection).
//!
//! # Supported Transports
//!
//! - **SSH** (via `ssh2`, the `ssh2-backend` feature, enabled by default)
//!
//! # Example
//!
//! ```rust,ignore
//! use flock::connection::{AuthMethod, Connector, SshConnector};
//! use flock::inventory::HostAddress;
//!
//! let connector = SshConnector::default();
//! let address = HostAddress::new("10.0.0.5", "deploy");
//! let mut transport = connector.connect(&address, &AuthMethod::Agent)?;
//! let status = transport.execute("uname -a")?;
//! ```

/// Connection configuration types.
pub mod config;

/// SSH implementation using libssh2 bindings.
#[cfg(feature = "ssh2-backend")]
pub mod ssh;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::HostAddress;

pub use config::ConnectionConfig;
#[cfg(feature = "ssh2-backend")]
pub use ssh::{SshConnector, SshTransport};

/// Errors that can occur during connection operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish initial connection to the host.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote host.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed (not to be confused with non-zero exit code).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Connection timed out.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// The specified host could not be resolved.
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SSH-specific error from the underlying implementation.
    #[error("SSH error: {0}")]
    SshError(String),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Connection was closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of capturing a command on a connection.
///
/// # Example
///
/// ```rust
/// use flock::connection::CommandResult;
///
/// let result = CommandResult::success("Hello".into());
/// assert!(result.success);
/// assert_eq!(result.exit_code, 0);
///
/// let failed = CommandResult::failure(1, String::new());
/// assert!(!failed.success);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code of the command (0 indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String) -> Self {
        Self {
            exit_code,
            stdout,
            success: false,
        }
    }

    /// Create a result from a raw exit status
    pub fn from_status(exit_code: i32, stdout: String) -> Self {
        if exit_code == 0 {
            Self::success(stdout)
        } else {
            Self::failure(exit_code, stdout)
        }
    }
}

/// Credentials used to authenticate a host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication.
    Password {
        /// The password
        password: String,
    },
    /// Private key authentication.
    Key {
        /// Path to the private key (`~` is expanded)
        private_key: PathBuf,
        /// Passphrase protecting the key
        #[serde(default)]
        passphrase: Option<String>,
    },
    /// Authentication through the running SSH agent.
    Agent,
}

impl AuthMethod {
    /// Password authentication
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    /// Key authentication without a passphrase
    pub fn key(private_key: impl Into<PathBuf>) -> Self {
        Self::Key {
            private_key: private_key.into(),
            passphrase: None,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::Password { .. } => "password",
            AuthMethod::Key { .. } => "key",
            AuthMethod::Agent => "agent",
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { .. } => f.write_str("Password(***)"),
            AuthMethod::Key { private_key, .. } => {
                f.debug_struct("Key").field("private_key", private_key).finish()
            }
            AuthMethod::Agent => f.write_str("Agent"),
        }
    }
}

/// Pseudo-terminal type requested for each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyType {
    /// Plain terminal with no special capabilities
    #[default]
    Vanilla,
    /// DEC VT100
    Vt100,
    /// DEC VT102
    Vt102,
    /// DEC VT220
    Vt220,
    /// ANSI terminal
    Ansi,
    /// xterm
    Xterm,
}

impl PtyType {
    /// Terminal name sent in the pty request
    pub fn term(&self) -> &'static str {
        match self {
            PtyType::Vanilla => "vanilla",
            PtyType::Vt100 => "vt100",
            PtyType::Vt102 => "vt102",
            PtyType::Vt220 => "vt220",
            PtyType::Ansi => "ansi",
            PtyType::Xterm => "xterm",
        }
    }
}

impl fmt::Display for PtyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.term())
    }
}

impl std::str::FromStr for PtyType {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vanilla" => Ok(PtyType::Vanilla),
            "vt100" => Ok(PtyType::Vt100),
            "vt102" => Ok(PtyType::Vt102),
            "vt220" => Ok(PtyType::Vt220),
            "ansi" => Ok(PtyType::Ansi),
            "xterm" => Ok(PtyType::Xterm),
            other => Err(ConnectionError::InvalidConfig(format!(
                "Unknown pty type '{}'",
                other
            ))),
        }
    }
}

/// An authenticated session to one remote host.
///
/// Every command handed to a transport is already fully composed; the
/// transport runs it in a fresh channel, so no shell state survives between
/// two calls.
pub trait Transport: Send {
    /// Get the connection identifier (`user@host:port`)
    fn identifier(&self) -> &str;

    /// Run a command, streaming its output to the local terminal, and return
    /// the remote exit status.
    fn execute(&mut self, command: &str) -> ConnectionResult<i32>;

    /// Run a command and capture its standard output.
    fn capture(&mut self, command: &str) -> ConnectionResult<CommandResult>;

    /// The pseudo-terminal requested for subsequent commands (`None` = no pty)
    fn pty_type(&self) -> Option<PtyType>;

    /// Change the pseudo-terminal requested for subsequent commands
    fn set_pty_type(&mut self, pty: Option<PtyType>);

    /// Close the session
    fn close(&mut self) -> ConnectionResult<()> {
        Ok(())
    }
}

/// Opens authenticated transports.
pub trait Connector {
    /// Connect and authenticate to `address` using `auth`.
    fn connect(
        &self,
        address: &HostAddress,
        auth: &AuthMethod,
    ) -> ConnectionResult<Box<dyn Transport>>;
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn connect(
        &self,
        address: &HostAddress,
        auth: &AuthMethod,
    ) -> ConnectionResult<Box<dyn Transport>> {
        (**self).connect(address, auth)
    }
}

/// A connector for builds without an SSH backend; every attempt fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableConnector;

impl Connector for UnavailableConnector {
    fn connect(
        &self,
        _address: &HostAddress,
        _auth: &AuthMethod,
    ) -> ConnectionResult<Box<dyn Transport>> {
        Err(ConnectionError::InvalidConfig(
            "No SSH backend available. Enable the 'ssh2-backend' feature.".to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_from_status() {
        assert_eq!(
            CommandResult::from_status(0, "ok".into()),
            CommandResult::success("ok".into())
        );
        let failed = CommandResult::from_status(2, "partial".into());
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 2);
        assert_eq!(failed.stdout, "partial");
    }

    #[test]
    fn test_pty_type_parsing() {
        assert_eq!("xterm".parse::<PtyType>().unwrap(), PtyType::Xterm);
        assert_eq!("VT100".parse::<PtyType>().unwrap(), PtyType::Vt100);
        assert!("teletype".parse::<PtyType>().is_err());
        assert_eq!(PtyType::default().term(), "vanilla");
    }

    #[test]
    fn test_auth_method_debug_hides_password() {
        let auth = AuthMethod::password("hunter2");
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(auth.kind(), "password");
    }

    #[test]
    fn test_auth_method_deserialize() {
        use serde_yaml::with::singleton_map;

        let auth: AuthMethod = singleton_map::deserialize(serde_yaml::Deserializer::from_str(
            "key:\n  private_key: ~/.ssh/deploy\n",
        ))
        .unwrap();
        assert_eq!(auth, AuthMethod::key("~/.ssh/deploy"));

        let agent: AuthMethod =
            singleton_map::deserialize(serde_yaml::Deserializer::from_str("agent")).unwrap();
        assert_eq!(agent, AuthMethod::Agent);
    }

    #[test]
    fn test_unavailable_connector() {
        let address = HostAddress::new("10.0.0.1", "deploy");
        let err = UnavailableConnector
            .connect(&address, &AuthMethod::Agent)
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    }
}
