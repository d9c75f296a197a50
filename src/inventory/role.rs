//! Host roles and the role filter.
//!
//! A role is a tag used purely for selecting hosts. Roles are not ordered
//! and a host may hold any number of them; two role sets match when they
//! share at least one member.

use serde::{Deserialize, Serialize};

/// Role a host plays in a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Application server
    App,
    /// Database server
    Db,
    /// Web server
    Web,
}

impl Role {
    /// All roles, in declaration order
    pub const ALL: [Role; 3] = [Role::App, Role::Db, Role::Web];

    /// Lower-case name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::App => "app",
            Role::Db => "db",
            Role::Web => "web",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "app" => Ok(Role::App),
            "db" => Ok(Role::Db),
            "web" => Ok(Role::Web),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0} (expected app, db or web)")]
pub struct RoleParseError(pub String);

/// Anything carrying a set of declared roles.
pub trait HasRoles {
    /// Declared roles
    fn roles(&self) -> &[Role];

    /// Returns true if any declared role is in `requested`.
    fn has_any_role(&self, requested: &[Role]) -> bool {
        self.roles().iter().any(|role| requested.contains(role))
    }
}

/// Selects the hosts holding at least one of `roles`, preserving order.
pub fn hosts_with_any_of<'a, T: HasRoles>(hosts: &'a [T], roles: &[Role]) -> Vec<&'a T> {
    hosts.iter().filter(|host| host.has_any_role(roles)).collect()
}

/// Mutable form of [`hosts_with_any_of`], for running commands on the
/// selected connections.
pub fn hosts_with_any_of_mut<'a, T: HasRoles>(
    hosts: &'a mut [T],
    roles: &[Role],
) -> Vec<&'a mut T> {
    hosts
        .iter_mut()
        .filter(|host| host.has_any_role(roles))
        .collect()
}
