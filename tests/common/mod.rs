//! Shared test utilities and fixtures for the Flock test suite.
//!
//! This module provides:
//! - A scripted [`MockConnector`] handing out [`MockTransport`]s that record
//!   every command they receive
//! - Environment fixtures for orchestrator tests
//! - Temporary Flockfile and config helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use flock::connection::{
    AuthMethod, CommandResult, ConnectionError, ConnectionResult, Connector, PtyType, Transport,
};
use flock::inventory::HostAddress;
use flock::server::HostConnection;

// ============================================================================
// Mock Connector / Transport
// ============================================================================

/// A command received by a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// IP of the host the command was sent to
    pub host: String,
    /// Fully composed command line
    pub command: String,
    /// Pty mode in effect when the command was sent
    pub pty: Option<PtyType>,
}

#[derive(Debug, Default)]
struct MockState {
    connections: Mutex<Vec<String>>,
    auth_used: Mutex<Vec<AuthMethod>>,
    commands: Mutex<Vec<SentCommand>>,
    results: Mutex<HashMap<(String, String), CommandResult>>,
    unreachable: Mutex<HashSet<String>>,
}

/// Scripted connector shared between a test and the `Flock` under test.
///
/// Clones share state, so a test keeps one handle and passes another to
/// `Flock::new`.
///
/// # Example
///
/// ```rust,ignore
/// let mock = MockConnector::new();
/// mock.set_status("10.0.0.2", "echo hi", 1);
/// let flock = Flock::new(mock.clone());
/// // ...
/// assert_eq!(mock.commands_for("10.0.0.1"), vec!["echo hi"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Create a new mock connector where every host is reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of `command` on host `ip`.
    pub fn set_result(&self, ip: &str, command: &str, result: CommandResult) {
        self.state
            .results
            .lock()
            .insert((ip.to_string(), command.to_string()), result);
    }

    /// Script the exit status of `command` on host `ip`.
    pub fn set_status(&self, ip: &str, command: &str, status: i32) {
        self.set_result(ip, command, CommandResult::from_status(status, String::new()));
    }

    /// Script the captured output of `command` on host `ip`.
    pub fn set_output(&self, ip: &str, command: &str, status: i32, output: &str) {
        self.set_result(
            ip,
            command,
            CommandResult::from_status(status, output.to_string()),
        );
    }

    /// Make connection attempts to `ip` fail.
    pub fn set_unreachable(&self, ip: &str) {
        self.state.unreachable.lock().insert(ip.to_string());
    }

    /// Display forms of every connection attempt, in order.
    pub fn connections(&self) -> Vec<String> {
        self.state.connections.lock().clone()
    }

    /// Credentials used by every connection attempt, in order.
    pub fn auth_used(&self) -> Vec<AuthMethod> {
        self.state.auth_used.lock().clone()
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<SentCommand> {
        self.state.commands.lock().clone()
    }

    /// Command lines received by host `ip`, in order.
    pub fn commands_for(&self, ip: &str) -> Vec<String> {
        self.state
            .commands
            .lock()
            .iter()
            .filter(|sent| sent.host == ip)
            .map(|sent| sent.command.clone())
            .collect()
    }

    /// Open a connection directly, bypassing `Flock`.
    pub fn host_connection(&self, address: HostAddress) -> HostConnection {
        HostConnection::connect(&address, &AuthMethod::Agent, self).unwrap()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        address: &HostAddress,
        auth: &AuthMethod,
    ) -> ConnectionResult<Box<dyn Transport>> {
        self.state.connections.lock().push(address.to_string());
        self.state.auth_used.lock().push(auth.clone());

        if self.state.unreachable.lock().contains(&address.ip) {
            return Err(ConnectionError::ConnectionFailed(format!(
                "Failed to connect to {}:{}: Connection refused",
                address.ip, address.port
            )));
        }

        Ok(Box::new(MockTransport {
            identifier: address.to_string(),
            ip: address.ip.clone(),
            pty: Some(PtyType::Vanilla),
            state: self.state.clone(),
        }))
    }
}

/// Transport recording into the shared mock state.
#[derive(Debug)]
pub struct MockTransport {
    identifier: String,
    ip: String,
    pty: Option<PtyType>,
    state: Arc<MockState>,
}

impl MockTransport {
    fn record(&self, command: &str) -> CommandResult {
        self.state.commands.lock().push(SentCommand {
            host: self.ip.clone(),
            command: command.to_string(),
            pty: self.pty,
        });
        self.state
            .results
            .lock()
            .get(&(self.ip.clone(), command.to_string()))
            .cloned()
            .unwrap_or_else(|| CommandResult::success(String::new()))
    }
}

impl Transport for MockTransport {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn execute(&mut self, command: &str) -> ConnectionResult<i32> {
        Ok(self.record(command).exit_code)
    }

    fn capture(&mut self, command: &str) -> ConnectionResult<CommandResult> {
        Ok(self.record(command))
    }

    fn pty_type(&self) -> Option<PtyType> {
        self.pty
    }

    fn set_pty_type(&mut self, pty: Option<PtyType>) {
        self.pty = pty;
    }
}

// ============================================================================
// Output capture
// ============================================================================

/// In-memory sink for a connection's echoed output.
///
/// Clones share the buffer, so a test keeps one handle and passes another
/// to `HostConnection::with_output`.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, with color codes left in place.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A host address for `deploy@ip:22`.
pub fn host(ip: &str) -> HostAddress {
    HostAddress::new(ip, "deploy")
}

/// Temporary directory holding a Flockfile and optional config.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    /// Create a project with the given Flockfile content.
    pub fn new(flockfile: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Flockfile.yml"), flockfile).unwrap();
        Self { dir }
    }

    /// Write an extra file into the project.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Project root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the Flockfile.
    pub fn flockfile(&self) -> PathBuf {
        self.dir.path().join("Flockfile.yml")
    }
}
