//! Environment selection.
//!
//! An [`Environment`] populates a [`Flock`] with hosts and tasks. One base
//! environment always applies; at most one named environment applies on top
//! of it, chosen by name from the command line.

use crate::error::Result;
use crate::flock::Flock;

/// Name of the environment used when none is requested
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// A named set of hosts and tasks
pub trait Environment {
    /// Name the environment is selected by.
    ///
    /// Defaults to the lower-cased type name without its module path or
    /// generic parameters, so `struct Staging;` is selected by `staging`.
    fn name(&self) -> String {
        type_name_key(std::any::type_name_of_val(self))
    }

    /// Register hosts and tasks
    fn configure(&self, flock: &mut Flock) -> Result<()>;
}

/// Last path segment of a type name, generics stripped, lower-cased
pub(crate) fn type_name_key(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_lowercase()
}

/// Pick the first environment whose name equals `requested`
pub fn select<'a>(
    environments: &[&'a dyn Environment],
    requested: &str,
) -> Option<&'a dyn Environment> {
    environments
        .iter()
        .copied()
        .find(|env| env.name() == requested)
}
