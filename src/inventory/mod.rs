//! Host inventory for Flock.
//!
//! This module provides:
//! - [`HostAddress`], the static description of a remote host
//! - [`Role`] and the role filter used to narrow a host list
//! - [`Inventory`], the ordered list of hosts declared for a run

pub mod host;
pub mod role;

pub use host::{HostAddress, HostParseError};
pub use role::{hosts_with_any_of, hosts_with_any_of_mut, HasRoles, Role, RoleParseError};

/// Hosts declared for a run, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    hosts: Vec<HostAddress>,
}

impl Inventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a host
    pub fn add(&mut self, host: HostAddress) {
        self.hosts.push(host);
    }

    /// All hosts, in declaration order
    pub fn hosts(&self) -> &[HostAddress] {
        &self.hosts
    }

    /// Hosts holding any of `roles`
    pub fn with_any_of(&self, roles: &[Role]) -> Vec<&HostAddress> {
        hosts_with_any_of(&self.hosts, roles)
    }

    /// Number of hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true if no hosts are declared
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl FromIterator<HostAddress> for Inventory {
    fn from_iter<I: IntoIterator<Item = HostAddress>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}
