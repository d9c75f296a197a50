//! Live connections to remote hosts.
//!
//! A [`HostConnection`] wraps one authenticated transport together with a
//! command-context stack. Every command sent through the connection is
//! prefixed with the directory frames currently on the stack, and runs under
//! the pseudo-terminal mode set by the innermost pty frame.
//!
//! Frames are pushed by [`HostConnection::enter`], which returns a
//! [`ContextGuard`]. Dropping the guard pops the frame, so the stack returns
//! to its previous state on every exit path, including `?` returns and
//! panics unwinding through the block.
//!
//! ```rust,ignore
//! host.within("/srv/app", |host| {
//!     host.execute("git pull")?;
//!     host.with_pty(None, |host| host.execute("bin/migrate"))
//! })?;
//! ```

use std::fmt;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use tracing::{debug, trace};

use crate::connection::{AuthMethod, Connector, PtyType, Transport};
use crate::error::{Error, Result, TaskError};
use crate::inventory::{HasRoles, HostAddress, Role};
use crate::output;

/// One entry of the command-context stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextFrame {
    /// Prefix every command with `cd <dir>`
    Directory(String),
    /// Run commands under this pseudo-terminal mode (`None` = no pty)
    Pty(Option<PtyType>),
}

impl ContextFrame {
    /// Directory frame
    pub fn directory(dir: impl Into<String>) -> Self {
        ContextFrame::Directory(dir.into())
    }
}

#[derive(Debug)]
struct StackEntry {
    frame: ContextFrame,
    /// Pty mode in effect before a pty frame was pushed
    saved_pty: Option<Option<PtyType>>,
}

/// An authenticated session to one host plus its command context
pub struct HostConnection {
    address: HostAddress,
    transport: Box<dyn Transport>,
    stack: Vec<StackEntry>,
    /// Where composed commands and failed captures are echoed
    out: Box<dyn Write + Send>,
}

impl HostConnection {
    /// Connect and authenticate to `address`.
    ///
    /// Prints `Connecting to user@ip:port...` before the attempt. Any
    /// transport or authentication failure is returned as
    /// [`Error::ConnectionFailed`].
    pub fn connect(
        address: &HostAddress,
        auth: &AuthMethod,
        connector: &dyn Connector,
    ) -> Result<Self> {
        let host = address.to_string();
        output::connecting(&host);

        let transport = connector
            .connect(address, auth)
            .map_err(|e| Error::connection_failed(host.clone(), e))?;

        debug!(host = %host, "Connected");
        Ok(Self::from_transport(address.clone(), transport))
    }

    /// Wrap an already authenticated transport
    pub fn from_transport(address: HostAddress, transport: Box<dyn Transport>) -> Self {
        Self {
            address,
            transport,
            stack: Vec::new(),
            out: Box::new(io::stdout()),
        }
    }

    /// Echo commands to `out` instead of standard output
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    /// The address this connection was opened for
    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    /// The current context frames, outermost first
    pub fn context(&self) -> Vec<&ContextFrame> {
        self.stack.iter().map(|entry| &entry.frame).collect()
    }

    /// Number of frames on the context stack
    pub fn context_depth(&self) -> usize {
        self.stack.len()
    }

    /// Pseudo-terminal mode used by the next command
    pub fn pty_type(&self) -> Option<PtyType> {
        self.transport.pty_type()
    }

    /// Push `frame` and return a guard that pops it when dropped.
    pub fn enter(&mut self, frame: ContextFrame) -> ContextGuard<'_> {
        let depth = self.stack.len();
        let saved_pty = match &frame {
            ContextFrame::Pty(mode) => {
                let previous = self.transport.pty_type();
                self.transport.set_pty_type(*mode);
                Some(previous)
            }
            ContextFrame::Directory(_) => None,
        };

        trace!(host = %self, frame = ?frame, depth = depth + 1, "Entering context");
        self.stack.push(StackEntry { frame, saved_pty });

        ContextGuard {
            connection: self,
            depth,
        }
    }

    /// Unwind the stack down to `depth` frames, restoring pty modes
    fn unwind_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(entry) = self.stack.pop() {
                if let Some(previous) = entry.saved_pty {
                    self.transport.set_pty_type(previous);
                }
            }
        }
    }

    /// Run `block` with `frame` pushed; the frame is popped afterwards,
    /// whether the block succeeded or not.
    pub fn with_context_frame<F, R>(&mut self, frame: ContextFrame, block: F) -> R
    where
        F: FnOnce(&mut HostConnection) -> R,
    {
        let mut guard = self.enter(frame);
        block(&mut *guard)
    }

    /// Run `block` with every command prefixed by `cd <dir>`.
    pub fn within<F, R>(&mut self, dir: impl Into<String>, block: F) -> R
    where
        F: FnOnce(&mut HostConnection) -> R,
    {
        self.with_context_frame(ContextFrame::Directory(dir.into()), block)
    }

    /// Run `block` under pseudo-terminal `mode` (`None` disables the pty).
    pub fn with_pty<F, R>(&mut self, mode: Option<PtyType>, block: F) -> R
    where
        F: FnOnce(&mut HostConnection) -> R,
    {
        self.with_context_frame(ContextFrame::Pty(mode), block)
    }

    /// Run `block` only if this host holds one of `roles`.
    pub fn on_roles<F, E>(&mut self, roles: &[Role], block: F) -> std::result::Result<(), E>
    where
        F: FnOnce(&mut HostConnection) -> std::result::Result<(), E>,
    {
        if self.has_any_role(roles) {
            block(self)
        } else {
            trace!(host = %self, roles = ?roles, "Skipping block for unmatched roles");
            Ok(())
        }
    }

    /// Prefix `command` with the directory frames on the stack.
    pub fn compose_command(&self, command: &str) -> String {
        let mut parts: Vec<String> = self
            .stack
            .iter()
            .filter_map(|entry| match &entry.frame {
                ContextFrame::Directory(dir) => Some(format!("cd {}", dir)),
                ContextFrame::Pty(_) => None,
            })
            .collect();
        parts.push(command.to_string());
        parts.join("; ")
    }

    /// Run `command` in the current context, streaming its output.
    ///
    /// A non-zero exit status becomes a [`TaskError`] carrying the status.
    pub fn execute(&mut self, command: &str) -> Result<()> {
        let call = self.compose_command(command);
        output::command(&mut self.out, &self.address.to_string(), &call)?;

        let status = self.transport.execute(&call)?;
        debug!(host = %self, status, "Command finished");

        if status == 0 {
            Ok(())
        } else {
            Err(TaskError::status(status).into())
        }
    }

    /// Run `command` in the current context and return its standard output.
    ///
    /// On a non-zero exit status any captured output is printed before the
    /// [`TaskError`] is returned.
    pub fn capture(&mut self, command: &str) -> Result<String> {
        let call = self.compose_command(command);
        output::command(&mut self.out, &self.address.to_string(), &call)?;

        let result = self.transport.capture(&call)?;
        debug!(host = %self, status = result.exit_code, "Command finished");

        if result.success {
            Ok(result.stdout)
        } else {
            if !result.stdout.is_empty() {
                output::partial_output(&mut self.out, &result.stdout)?;
            }
            Err(TaskError::status(result.exit_code).into())
        }
    }

    /// Returns true if `command` exits with status 0
    pub fn command_succeeds(&mut self, command: &str) -> bool {
        self.execute(command).is_ok()
    }

    /// Returns true if `path` is a regular file on the host
    pub fn file_exists(&mut self, path: &str) -> bool {
        self.command_succeeds(&format!("test -f {}", path))
    }

    /// Returns true if `path` is a directory on the host
    pub fn directory_exists(&mut self, path: &str) -> bool {
        self.command_succeeds(&format!("test -d {}", path))
    }

    /// Returns true if `name` resolves to a command on the host
    pub fn command_exists(&mut self, name: &str) -> bool {
        self.command_succeeds(&format!("command -v {} >/dev/null 2>&1", name))
    }

    /// Close the underlying transport
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()?;
        Ok(())
    }
}

impl HasRoles for HostConnection {
    fn roles(&self) -> &[Role] {
        &self.address.roles
    }
}

impl fmt::Display for HostConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConnection")
            .field("address", &self.address.to_string())
            .field("transport", &self.transport.identifier())
            .field("stack", &self.stack)
            .finish()
    }
}

/// Scoped context frame; pops its frame when dropped.
///
/// Dereferences to the [`HostConnection`], so commands can be run through
/// the guard while the frame is active.
pub struct ContextGuard<'a> {
    connection: &'a mut HostConnection,
    depth: usize,
}

impl Deref for ContextGuard<'_> {
    type Target = HostConnection;

    fn deref(&self) -> &HostConnection {
        self.connection
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut HostConnection {
        self.connection
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        trace!(host = %self.connection, depth = self.depth, "Leaving context");
        self.connection.unwind_to(self.depth);
    }
}
