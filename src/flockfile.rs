//! Declarative task definitions.
//!
//! A Flockfile is a YAML document declaring hosts, named environments and
//! tasks for the `flock` binary:
//!
//! ```yaml
//! hosts:
//!   - deploy@10.0.0.1
//!   - ip: 10.0.0.2
//!     user: deploy
//!     roles: [db]
//!
//! environments:
//!   staging:
//!     hosts:
//!       - deploy@10.0.1.1
//!
//! tasks:
//!   deploy:
//!     steps:
//!       - run: git pull
//!         within: [/srv/app]
//!       - run: bin/migrate
//!         roles: [db]
//!         pty: none
//!         only_if:
//!           file_exists: /srv/app/bin/migrate
//! ```
//!
//! The file itself acts as the base [`Environment`] and as the
//! [`TaskSource`] for its top-level tasks. Each entry under `environments`
//! becomes a [`FlockfileEnvironment`] selected by its key.
//!
//! A task runs its steps in order. Each step runs on every matching host in
//! declaration order before the next step starts; the first failure stops
//! the task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::parse_pty;
use crate::connection::config::DEFAULT_PORT;
use crate::connection::AuthMethod;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::flock::Flock;
use crate::inventory::{HasRoles, HostAddress, Role};
use crate::server::{ContextFrame, HostConnection};
use crate::tasks::{Task, TaskSource};

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A host entry: either `user@host[:port]` or a full mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostEntry {
    /// `user@host[:port]`
    Address(String),
    /// Full host description
    Detailed(HostSpec),
}

/// Full host description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    /// IP address or host name
    #[serde(alias = "host")]
    pub ip: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user; falls back to `defaults.remote_user`
    #[serde(default)]
    pub user: Option<String>,

    /// Credential; falls back to the configured default
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub auth: Option<AuthMethod>,

    /// Declared roles
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl HostEntry {
    fn to_address(&self, default_user: Option<&str>) -> std::result::Result<HostAddress, String> {
        match self {
            HostEntry::Address(spec) => HostAddress::parse(spec).map_err(|e| e.to_string()),
            HostEntry::Detailed(spec) => {
                let user = spec
                    .user
                    .as_deref()
                    .or(default_user)
                    .ok_or_else(|| {
                        format!(
                            "host '{}' has no user and no default remote user is configured",
                            spec.ip
                        )
                    })?;
                let mut address = HostAddress::new(spec.ip.clone(), user)
                    .port(spec.port)
                    .roles(spec.roles.iter().copied());
                address.auth = spec.auth.clone();
                Ok(address)
            }
        }
    }
}

/// Guard deciding whether a step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `test -f <path>`
    FileExists(String),
    /// `test -d <path>`
    DirectoryExists(String),
    /// `command -v <name>`
    CommandExists(String),
    /// Any command exiting with status 0
    CommandSucceeds(String),
}

impl Condition {
    /// Evaluate the condition on `host`
    pub fn holds(&self, host: &mut HostConnection) -> bool {
        match self {
            Condition::FileExists(path) => host.file_exists(path),
            Condition::DirectoryExists(path) => host.directory_exists(path),
            Condition::CommandExists(name) => host.command_exists(name),
            Condition::CommandSucceeds(command) => host.command_succeeds(command),
        }
    }
}

/// One command of a task, with its context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Step {
    /// Command to execute, streaming its output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Command whose output is captured and logged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,

    /// Directories to change into, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub within: Vec<String>,

    /// Only run on hosts with one of these roles
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,

    /// Pseudo-terminal mode for the command (`none` disables it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pty: Option<String>,

    /// Run only if this condition holds
    #[serde(
        with = "serde_yaml::with::singleton_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub only_if: Option<Condition>,

    /// Skip if this condition holds
    #[serde(
        with = "serde_yaml::with::singleton_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub unless: Option<Condition>,
}

impl Step {
    fn validate(&self) -> std::result::Result<(), String> {
        match (&self.run, &self.capture) {
            (Some(_), Some(_)) => {
                return Err("a step cannot have both 'run' and 'capture'".to_string())
            }
            (None, None) => return Err("a step needs either 'run' or 'capture'".to_string()),
            _ => {}
        }
        if let Some(pty) = &self.pty {
            parse_pty(pty).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Context frames the command runs under, outermost first
    fn frames(&self) -> Result<Vec<ContextFrame>> {
        let mut frames: Vec<ContextFrame> = self
            .within
            .iter()
            .map(|dir| ContextFrame::Directory(dir.clone()))
            .collect();
        if let Some(pty) = &self.pty {
            let mode = parse_pty(pty).map_err(|e| Error::Config(e.to_string()))?;
            frames.push(ContextFrame::Pty(mode));
        }
        Ok(frames)
    }

    /// Run the step on one host
    pub fn run_on(&self, host: &mut HostConnection) -> Result<()> {
        if !self.roles.is_empty() && !host.has_any_role(&self.roles) {
            debug!(host = %host, roles = ?self.roles, "Skipping step");
            return Ok(());
        }

        let frames = self.frames()?;
        in_context(host, &frames, &mut |host: &mut HostConnection| {
            if let Some(condition) = &self.only_if {
                if !condition.holds(host) {
                    debug!(host = %host, condition = ?condition, "only_if not met");
                    return Ok(());
                }
            }
            if let Some(condition) = &self.unless {
                if condition.holds(host) {
                    debug!(host = %host, condition = ?condition, "unless met");
                    return Ok(());
                }
            }

            if let Some(command) = &self.run {
                host.execute(command)
            } else if let Some(command) = &self.capture {
                let output = host.capture(command)?;
                info!(host = %host, command = %command, output = %output.trim_end(), "Captured");
                Ok(())
            } else {
                Ok(())
            }
        })
    }
}

/// Run `block` with `frames` pushed onto the host's context stack
fn in_context(
    host: &mut HostConnection,
    frames: &[ContextFrame],
    block: &mut dyn FnMut(&mut HostConnection) -> Result<()>,
) -> Result<()> {
    match frames.split_first() {
        None => block(host),
        Some((frame, rest)) => {
            host.with_context_frame(frame.clone(), |host| in_context(host, rest, block))
        }
    }
}

/// A task declared in a Flockfile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskSpec {
    /// Namespace; the task is invoked as `namespace:name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Steps, in order
    pub steps: Vec<Step>,
}

impl TaskSpec {
    fn to_task(&self, name: &str) -> Task {
        let steps = Arc::new(self.steps.clone());
        let task = Task::new(name, move |hosts| {
            run_steps(&steps, hosts)?;
            Ok(())
        });
        match &self.namespace {
            Some(namespace) => task.in_namespace(namespace.clone()),
            None => task,
        }
    }
}

/// Run each step on every host, step by step
pub fn run_steps(steps: &[Step], hosts: &mut [HostConnection]) -> Result<()> {
    for step in steps {
        for host in hosts.iter_mut() {
            step.run_on(host)?;
        }
    }
    Ok(())
}

/// Hosts and tasks of one named environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentSpec {
    /// Hosts added by the environment
    pub hosts: Vec<HostEntry>,
    /// Tasks added by the environment
    pub tasks: IndexMap<String, TaskSpec>,
}

/// A parsed Flockfile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Flockfile {
    /// Base hosts
    pub hosts: Vec<HostEntry>,

    /// Named environments
    pub environments: IndexMap<String, EnvironmentSpec>,

    /// Base tasks
    pub tasks: IndexMap<String, TaskSpec>,

    #[serde(skip)]
    path: PathBuf,

    #[serde(skip)]
    remote_user: Option<String>,
}

impl Flockfile {
    /// Read and validate the Flockfile at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::flockfile_load(path, e.to_string()))?;
        let mut flockfile = Self::parse(&content).map_err(|e| match e {
            Error::FlockfileLoad { message, .. } => Error::flockfile_load(path, message),
            other => Error::flockfile_load(path, other.to_string()),
        })?;
        flockfile.path = path.to_path_buf();
        debug!(
            path = %path.display(),
            hosts = flockfile.hosts.len(),
            environments = flockfile.environments.len(),
            tasks = flockfile.tasks.len(),
            "Loaded Flockfile"
        );
        Ok(flockfile)
    }

    /// Parse and validate Flockfile text
    pub fn parse(content: &str) -> Result<Self> {
        let flockfile: Flockfile = serde_yaml::from_str(content)?;
        flockfile.validate()?;
        Ok(flockfile)
    }

    fn validate(&self) -> Result<()> {
        let all_tasks = self
            .tasks
            .iter()
            .chain(self.environments.values().flat_map(|env| env.tasks.iter()));
        for (name, task) in all_tasks {
            for (index, step) in task.steps.iter().enumerate() {
                step.validate().map_err(|message| {
                    Error::flockfile_load(
                        &self.path,
                        format!("task '{}', step {}: {}", name, index + 1, message),
                    )
                })?;
            }
        }
        Ok(())
    }

    /// User for hosts declared without one
    pub fn with_remote_user(mut self, user: Option<&str>) -> Self {
        self.remote_user = user.map(String::from);
        self
    }

    /// Path the Flockfile was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The named environments, in file order
    pub fn environments(&self) -> Vec<FlockfileEnvironment<'_>> {
        self.environments
            .iter()
            .map(|(name, spec)| FlockfileEnvironment {
                name,
                spec,
                flockfile: self,
            })
            .collect()
    }

    fn serve_all(&self, flock: &mut Flock, hosts: &[HostEntry]) -> Result<()> {
        for entry in hosts {
            let address = entry
                .to_address(self.remote_user.as_deref())
                .map_err(|message| Error::flockfile_load(&self.path, message))?;
            flock.serve(address)?;
        }
        Ok(())
    }
}

impl Environment for Flockfile {
    fn name(&self) -> String {
        "base".to_string()
    }

    fn configure(&self, flock: &mut Flock) -> Result<()> {
        self.serve_all(flock, &self.hosts)?;
        flock.use_source(self);
        Ok(())
    }
}

impl TaskSource for Flockfile {
    fn name(&self) -> &str {
        "flockfile"
    }

    fn tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .map(|(name, spec)| spec.to_task(name))
            .collect()
    }
}

/// A named environment of a Flockfile
#[derive(Debug, Clone, Copy)]
pub struct FlockfileEnvironment<'a> {
    name: &'a str,
    spec: &'a EnvironmentSpec,
    flockfile: &'a Flockfile,
}

impl Environment for FlockfileEnvironment<'_> {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn configure(&self, flock: &mut Flock) -> Result<()> {
        self.flockfile.serve_all(flock, &self.spec.hosts)?;
        for (name, spec) in &self.spec.tasks {
            flock.add_task(spec.to_task(name));
        }
        Ok(())
    }
}
