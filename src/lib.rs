//! # Flock - A Remote Deployment Task Runner
//!
//! Flock connects to a set of remote hosts over SSH and runs user-defined,
//! possibly nested sequences of shell commands against them, selected by the
//! roles each host plays.
//!
//! ## Core Concepts
//!
//! - **Hosts**: [`HostAddress`](inventory::HostAddress) describes where a host
//!   lives and which [`Role`](inventory::Role)s it plays
//! - **Connections**: [`HostConnection`](server::HostConnection) wraps one
//!   authenticated session and a command-context stack (working directory and
//!   pseudo-terminal mode) that nests and unwinds with scoped guards
//! - **Tasks**: named bodies invoked with every connected host
//! - **Environments**: a base environment plus one named environment
//!   (`production`, `staging`, ...) declare the hosts and tasks of a run
//! - **Dispatch**: [`Flock`] resolves the requested task, connects the hosts
//!   and turns the outcome into a process exit code
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! │        (clap parsing, config loading, Flockfile)          │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Flock orchestrator                    │
//! │   (environment selection, task registry, dispatch)        │
//! └──────────────────────────────────────────────────────────┘
//!              │                               │
//!              ▼                               ▼
//! ┌─────────────────────────┐   ┌─────────────────────────────┐
//! │  Inventory + roles      │   │  HostConnection             │
//! │  (declared hosts,       │   │  (context stack, execute,   │
//! │   role filter)          │   │   capture, predicates)      │
//! └─────────────────────────┘   └─────────────────────────────┘
//!                                              │
//!                                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │               Connector / Transport (ssh2)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use flock::prelude::*;
//!
//! struct Base;
//! struct Production;
//!
//! impl Environment for Base {
//!     fn configure(&self, flock: &mut Flock) -> Result<()> {
//!         flock.add_task(Task::new("deploy", |hosts| {
//!             for host in hosts_with_any_of_mut(hosts, &[Role::App]) {
//!                 host.within("/srv/app", |host| host.execute("git pull"))?;
//!             }
//!             Ok(())
//!         }));
//!         Ok(())
//!     }
//! }
//!
//! impl Environment for Production {
//!     fn configure(&self, flock: &mut Flock) -> Result<()> {
//!         flock.serve(HostAddress::new("10.0.0.5", "deploy").roles([Role::App]))
//!     }
//! }
//!
//! fn main() {
//!     let mut flock = Flock::new(SshConnector::default())
//!         .with_default_auth(Some(AuthMethod::Agent));
//!     if let Err(err) = flock.configure(&Base, &[&Production], None) {
//!         eprintln!("{}", err);
//!         std::process::exit(1);
//!     }
//!     std::process::exit(flock.run(&Request::Run("deploy".into())));
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! ```rust,ignore
    //! use flock::prelude::*;
    //! ```

    // Connection types
    #[cfg(feature = "ssh2-backend")]
    pub use crate::connection::SshConnector;
    pub use crate::connection::{AuthMethod, CommandResult, Connector, PtyType, Transport};

    // Error types
    pub use crate::error::{Error, Result, TaskError};

    // Hosts and roles
    pub use crate::inventory::{
        hosts_with_any_of, hosts_with_any_of_mut, HasRoles, HostAddress, Role,
    };

    // Execution
    pub use crate::environment::Environment;
    pub use crate::flock::{Flock, Request};
    pub use crate::server::{ContextFrame, HostConnection};
    pub use crate::tasks::{Task, TaskSource};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases for Flock operations.
///
/// This module provides the main [`Error`](error::Error) enum covering setup,
/// connection and dispatch failures, and the structured
/// [`TaskError`](error::TaskError) surfaced to the operator.
pub mod error;

/// Connection layer for remote host communication.
///
/// Defines the [`Transport`](connection::Transport) and
/// [`Connector`](connection::Connector) traits and the ssh2-backed
/// implementation.
pub mod connection;

/// Declared hosts and the role filter.
pub mod inventory;

/// Live host connections with the command-context stack.
pub mod server;

/// Tasks, task sources and the task registry.
pub mod tasks;

/// Environment selection.
pub mod environment;

/// The orchestrator: configuration state, hosts, tasks and dispatch.
pub mod flock;

// ============================================================================
// Configuration and Output
// ============================================================================

/// Configuration loading from files and environment variables.
pub mod config;

/// Declarative hosts, environments and tasks loaded from a Flockfile.
pub mod flockfile;

/// Terminal output helpers.
pub mod output;

pub use crate::error::{Error, Result, TaskError};
pub use crate::flock::{Flock, Request};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
