//! Error types for Flock.
//!
//! Two layers of errors exist:
//!
//! - [`TaskError`]: the structured failure a task surfaces to the operator. It
//!   carries a message, a remote exit status, or both, and knows how to render
//!   itself on the terminal.
//! - [`Error`]: the crate-wide error enum returned by every fallible library
//!   operation (setup, connection, dispatch, configuration loading).

use std::fmt;
use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

use crate::connection::ConnectionError;

/// Result type alias for Flock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A structured task failure.
///
/// Raised when a remote command exits with a non-zero status, or by task
/// bodies that want to stop the run with a readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    /// Human-readable description of the failure
    pub message: Option<String>,
    /// Exit status of the remote command that failed
    pub status: Option<i32>,
}

impl TaskError {
    /// Creates an error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            status: None,
        }
    }

    /// Creates an error carrying only a remote exit status.
    pub fn status(status: i32) -> Self {
        Self {
            message: None,
            status: Some(status),
        }
    }

    /// Attaches an exit status to this error.
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    /// Writes the error to standard output with the failure marker.
    pub fn output(&self) {
        println!("{}", self.to_string().red());
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.status) {
            (Some(message), Some(status)) => {
                write!(f, "Error: {} (exit status {})", message, status)
            }
            (Some(message), None) => write!(f, "Error: {}", message),
            (None, Some(status)) => write!(f, "Error: command failed with exit status {}", status),
            (None, None) => write!(f, "Error: task failed"),
        }
    }
}

impl std::error::Error for TaskError {}

/// The main error type for Flock.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Task Errors
    // ========================================================================
    /// A task failed with a structured error.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// No registered task has the requested full name.
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// `Flock::configure` was called more than once.
    #[error("`Flock::configure` should only be called once")]
    AlreadyConfigured,

    /// `Flock::run` was called before `Flock::configure`.
    #[error("Make sure to call `Flock::configure` before `Flock::run`")]
    NotConfigured,

    /// A host was declared without credentials and no default is configured.
    #[error(
        "You must either pass in an SSH auth method for '{host}' or configure a default one \
         (`ssh.identity_file` or `ssh.use_agent`)"
    )]
    MissingAuthMethod {
        /// Display form of the host (`user@ip:port`)
        host: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Failed to connect to or authenticate with a host.
    #[error("Couldn't connect to {host} ({source})")]
    ConnectionFailed {
        /// Display form of the host (`user@ip:port`)
        host: String,
        /// Underlying transport error
        #[source]
        source: ConnectionError,
    },

    /// A transport failure while a command was running.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error loading a Flockfile.
    #[error("Failed to load Flockfile '{path}': {message}")]
    FlockfileLoad {
        /// Path to the Flockfile
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl Error {
    /// Creates a new connection failed error.
    pub fn connection_failed(host: impl Into<String>, source: ConnectionError) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            source,
        }
    }

    /// Creates a new Flockfile load error.
    pub fn flockfile_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FlockfileLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the structured task error, if this is one.
    pub fn as_task_error(&self) -> Option<&TaskError> {
        match self {
            Error::Task(err) => Some(err),
            _ => None,
        }
    }
}
