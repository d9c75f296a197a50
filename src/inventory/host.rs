//! Host addresses.
//!
//! A [`HostAddress`] is the static description of one remote host: where it
//! lives, who to log in as, which credential to use and which roles it
//! plays. Addresses are created at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};

use super::role::{HasRoles, Role};
use crate::connection::config::DEFAULT_PORT;
use crate::connection::AuthMethod;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Where and how to reach a remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAddress {
    /// IP address or host name
    #[serde(alias = "host")]
    pub ip: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    pub user: String,

    /// Credential; `None` falls back to the configured default
    #[serde(
        default,
        with = "serde_yaml::with::singleton_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth: Option<AuthMethod>,

    /// Declared roles
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl HostAddress {
    /// Create an address on the default port with no roles and no credential
    pub fn new(ip: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            auth: None,
            roles: Vec::new(),
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the declared roles
    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Set the credential
    pub fn auth(mut self, auth: AuthMethod) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Parse `user@host[:port]`.
    ///
    /// IPv6 addresses must be bracketed (`user@[::1]:2222`); the brackets
    /// are not kept in [`HostAddress::ip`].
    pub fn parse(input: &str) -> Result<Self, HostParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(HostParseError::EmptyInput);
        }

        let (user, rest) = input
            .split_once('@')
            .ok_or_else(|| HostParseError::MissingUser(input.to_string()))?;
        if user.is_empty() {
            return Err(HostParseError::MissingUser(input.to_string()));
        }

        let (ip, port) = match rest.strip_prefix('[') {
            Some(bracketed) => {
                let (ip, after) = bracketed
                    .split_once(']')
                    .ok_or_else(|| HostParseError::InvalidHost(rest.to_string()))?;
                let port = match after {
                    "" => None,
                    _ => Some(
                        after
                            .strip_prefix(':')
                            .ok_or_else(|| HostParseError::InvalidHost(rest.to_string()))?,
                    ),
                };
                (ip, port)
            }
            None if rest.matches(':').count() > 1 => {
                return Err(HostParseError::InvalidHost(rest.to_string()))
            }
            None => match rest.split_once(':') {
                Some((ip, port)) => (ip, Some(port)),
                None => (rest, None),
            },
        };
        if ip.is_empty() {
            return Err(HostParseError::EmptyInput);
        }

        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| HostParseError::InvalidPort(port.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self::new(ip, user).port(port))
    }
}

impl HasRoles for HostAddress {
    fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl std::fmt::Display for HostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ip.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.ip, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.ip, self.port)
        }
    }
}

/// Errors that can occur when parsing a host address
#[derive(Debug, thiserror::Error)]
pub enum HostParseError {
    #[error("empty input")]
    EmptyInput,
    #[error("missing user in '{0}' (expected user@host[:port])")]
    MissingUser(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid host '{0}' (IPv6 addresses must be written as [addr]:port)")]
    InvalidHost(String),
}
