//! The Flock orchestrator.
//!
//! [`Flock`] owns everything a run needs: the configuration state, the
//! declared hosts, the registered tasks and the [`Connector`] used to reach
//! hosts. A run goes through three steps:
//!
//! 1. [`Flock::configure`] applies the base environment and the selected
//!    named environment, which declare hosts and tasks.
//! 2. [`Flock::try_run`] resolves the requested task, connects every host
//!    in declaration order and invokes the task body.
//! 3. [`Flock::run`] does the same and turns the outcome into an exit code,
//!    reporting any failure on the terminal.

use std::io::{self, Write};

use tracing::{debug, info};

use crate::connection::{AuthMethod, Connector};
use crate::environment::{self, Environment, DEFAULT_ENVIRONMENT};
use crate::error::{Error, Result, TaskError};
use crate::inventory::{HostAddress, Inventory};
use crate::output;
use crate::server::HostConnection;
use crate::tasks::{Task, TaskRegistry, TaskSource};

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List registered tasks
    PrintTasks,
    /// Run the task with this full name
    Run(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unconfigured,
    Configured { environment: String },
}

/// Hosts, tasks and configuration state for one run
pub struct Flock {
    state: State,
    connector: Box<dyn Connector>,
    default_auth: Option<AuthMethod>,
    inventory: Inventory,
    registry: TaskRegistry,
}

impl Flock {
    /// Create an unconfigured orchestrator reaching hosts through `connector`
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            state: State::Unconfigured,
            connector: Box::new(connector),
            default_auth: None,
            inventory: Inventory::new(),
            registry: TaskRegistry::new(),
        }
    }

    /// Credential used for hosts declared without one
    pub fn with_default_auth(mut self, auth: Option<AuthMethod>) -> Self {
        self.default_auth = auth;
        self
    }

    /// Apply `base`, then the first of `environments` named `requested`
    /// (default `production`).
    ///
    /// Must be called exactly once. An unknown environment name applies the
    /// base environment only.
    pub fn configure(
        &mut self,
        base: &dyn Environment,
        environments: &[&dyn Environment],
        requested: Option<&str>,
    ) -> Result<()> {
        if let State::Configured { .. } = self.state {
            return Err(Error::AlreadyConfigured);
        }

        let name = requested.unwrap_or(DEFAULT_ENVIRONMENT).to_string();
        self.state = State::Configured {
            environment: name.clone(),
        };

        debug!(environment = %base.name(), "Applying base environment");
        base.configure(self)?;

        match environment::select(environments, &name) {
            Some(selected) => {
                info!(environment = %name, "Applying environment");
                selected.configure(self)?;
            }
            None => debug!(environment = %name, "No matching environment, using base only"),
        }

        Ok(())
    }

    /// Name of the active environment, once configured
    pub fn environment(&self) -> Option<&str> {
        match &self.state {
            State::Configured { environment } => Some(environment),
            State::Unconfigured => None,
        }
    }

    /// Returns true once [`Flock::configure`] has been called
    pub fn is_configured(&self) -> bool {
        self.environment().is_some()
    }

    /// Declare a host.
    ///
    /// A host without a credential takes the default one; if there is no
    /// default either, this fails with [`Error::MissingAuthMethod`].
    pub fn serve(&mut self, mut address: HostAddress) -> Result<()> {
        let auth = self.auth_for(&address)?.clone();
        address.auth = Some(auth);
        debug!(host = %address, roles = ?address.roles, "Serving host");
        self.inventory.add(address);
        Ok(())
    }

    /// The host's own credential, else the default one
    fn auth_for<'a>(&'a self, address: &'a HostAddress) -> Result<&'a AuthMethod> {
        address
            .auth
            .as_ref()
            .or(self.default_auth.as_ref())
            .ok_or_else(|| Error::MissingAuthMethod {
                host: address.to_string(),
            })
    }

    /// Register every task of `source`
    pub fn use_source(&mut self, source: &dyn TaskSource) {
        self.registry.use_source(source);
    }

    /// Register a single task
    pub fn add_task(&mut self, task: Task) {
        self.registry.add(task);
    }

    /// Declared hosts, in declaration order
    pub fn hosts(&self) -> &[HostAddress] {
        self.inventory.hosts()
    }

    /// Registered tasks
    pub fn tasks(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Connect to one host
    fn connect(&self, address: &HostAddress) -> Result<HostConnection> {
        let auth = self.auth_for(address)?;
        HostConnection::connect(address, auth, self.connector.as_ref())
    }

    /// Connect every declared host in declaration order, stopping at the
    /// first failure.
    pub fn connect_all(&self) -> Result<Vec<HostConnection>> {
        self.inventory
            .hosts()
            .iter()
            .map(|address| self.connect(address))
            .collect()
    }

    /// Connect to each of `addresses` in turn and call `each` with the
    /// connection, stopping at the first error.
    pub fn go<F>(&self, addresses: &[HostAddress], mut each: F) -> anyhow::Result<()>
    where
        F: FnMut(&mut HostConnection) -> anyhow::Result<()>,
    {
        for address in addresses {
            let mut connection = self.connect(address)?;
            each(&mut connection)?;
        }
        Ok(())
    }

    /// Write the task list
    pub fn write_task_list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let names = self.registry.full_names();
        output::task_list(out, names.iter().map(String::as_str))
    }

    /// Handle `request`, returning any failure.
    pub fn try_run(&self, request: &Request) -> anyhow::Result<()> {
        let environment = self.environment().ok_or(Error::NotConfigured)?;

        match request {
            Request::PrintTasks => {
                let stdout = io::stdout();
                self.write_task_list(&mut stdout.lock())?;
                Ok(())
            }
            Request::Run(name) => {
                let task = self
                    .registry
                    .find(name)
                    .ok_or_else(|| Error::TaskNotFound(name.clone()))?;

                info!(task = %name, environment = %environment, "Running task");
                let mut hosts = self.connect_all()?;
                task.run(&mut hosts)
            }
        }
    }

    /// Handle `request` and return the process exit code.
    ///
    /// Failures are reported on standard output: a [`TaskError`] through its
    /// own formatting, anything else in red.
    pub fn run(&self, request: &Request) -> i32 {
        match self.try_run(request) {
            Ok(()) => 0,
            Err(err) => {
                report(&err);
                1
            }
        }
    }
}

/// Find the structured task error inside a task failure, if any
pub fn task_error(err: &anyhow::Error) -> Option<&TaskError> {
    err.downcast_ref::<TaskError>()
        .or_else(|| err.downcast_ref::<Error>().and_then(Error::as_task_error))
}

fn report(err: &anyhow::Error) {
    match task_error(err) {
        Some(task_error) => task_error.output(),
        None => output::error(&err.to_string()),
    }
}
