//! Tasks and task sources.
//!
//! A [`Task`] is a named body of deployment logic invoked with every
//! connected host. Tasks are collected into a [`TaskRegistry`], either one at
//! a time or in bulk from a [`TaskSource`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::server::HostConnection;

/// Signature of a task body
pub type TaskBody = dyn Fn(&mut [HostConnection]) -> anyhow::Result<()> + Send + Sync;

/// A named unit of deployment logic
#[derive(Clone)]
pub struct Task {
    name: String,
    namespace: Option<String>,
    body: Arc<TaskBody>,
}

impl Task {
    /// Create a task from its name and body
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut [HostConnection]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            namespace: None,
            body: Arc::new(body),
        }
    }

    /// Place the task under `namespace`
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace, if any
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name used on the command line: `namespace:name`, or just `name`
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}:{}", namespace, self.name),
            None => self.name.clone(),
        }
    }

    /// Invoke the body with the connected hosts
    pub fn run(&self, hosts: &mut [HostConnection]) -> anyhow::Result<()> {
        (self.body)(hosts)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// A unit that provides a group of tasks
pub trait TaskSource {
    /// Name identifying the source; used by the reuse check
    fn name(&self) -> &str;

    /// The tasks this source provides, in registration order
    fn tasks(&self) -> Vec<Task>;
}

/// Append-only collection of tasks
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    used_sources: HashSet<String>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single task
    pub fn add(&mut self, task: Task) {
        debug!(task = %task.full_name(), "Registering task");
        self.tasks.push(task);
    }

    /// Register every task of `source`.
    ///
    /// Registering the same source twice logs a warning; its tasks are
    /// appended again.
    pub fn use_source(&mut self, source: &dyn TaskSource) {
        if !self.used_sources.insert(source.name().to_string()) {
            warn!(source = source.name(), "Task source registered more than once");
        }
        for task in source.tasks() {
            self.add(task);
        }
    }

    /// Returns true if a source with this name has been registered
    pub fn is_source_used(&self, name: &str) -> bool {
        self.used_sources.contains(name)
    }

    /// Find a task by exact full name
    pub fn find(&self, full_name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.full_name() == full_name)
    }

    /// All tasks, in registration order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Full names of all tasks, in registration order
    pub fn full_names(&self) -> Vec<String> {
        self.tasks.iter().map(Task::full_name).collect()
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is registered
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
