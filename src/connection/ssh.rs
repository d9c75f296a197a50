//! SSH connection module
//!
//! This module provides SSH connectivity using the ssh2 crate.
//! It supports key-based authentication, password authentication
//! and SSH agent support. Every command runs in its own channel.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{Channel, ExtendedData, Session};
use tracing::{debug, trace, warn};

use super::config::{default_identity_files, expand_path, ConnectionConfig};
use super::{
    AuthMethod, CommandResult, ConnectionError, ConnectionResult, Connector, PtyType, Transport,
};
use crate::inventory::HostAddress;

/// Opens [`SshTransport`]s using libssh2
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: ConnectionConfig,
}

impl SshConnector {
    /// Create a connector with the given session settings
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// The session settings used for new connections
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Connector for SshConnector {
    fn connect(
        &self,
        address: &HostAddress,
        auth: &AuthMethod,
    ) -> ConnectionResult<Box<dyn Transport>> {
        let transport = SshTransport::connect(address, auth, &self.config)?;
        Ok(Box::new(transport))
    }
}

/// SSH connection implementation using ssh2 crate
pub struct SshTransport {
    /// Session identifier
    identifier: String,
    /// Authenticated SSH session
    session: Session,
    /// Pseudo-terminal requested for each channel
    pty: Option<PtyType>,
}

impl SshTransport {
    /// Connect to a remote host via SSH
    pub fn connect(
        address: &HostAddress,
        auth: &AuthMethod,
        config: &ConnectionConfig,
    ) -> ConnectionResult<Self> {
        let identifier = address.to_string();

        debug!(
            host = %address.ip,
            port = %address.port,
            user = %address.user,
            auth = auth.kind(),
            "Connecting via SSH"
        );

        let session = Self::do_connect(address, auth, config)?;

        Ok(Self {
            identifier,
            session,
            pty: config.pty,
        })
    }

    /// Perform the actual connection
    fn do_connect(
        address: &HostAddress,
        auth: &AuthMethod,
        config: &ConnectionConfig,
    ) -> ConnectionResult<Session> {
        let timeout = config.timeout_duration();
        let tcp = Self::open_tcp(&address.ip, address.port, timeout)?;

        tcp.set_nodelay(true).ok();

        // Create SSH session
        let mut session = Session::new().map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to create SSH session: {}", e))
        })?;

        session.set_tcp_stream(tcp);
        session.set_timeout(session_timeout_ms(timeout));

        if config.compression {
            session.set_compress(true);
        }

        // Perform SSH handshake
        session.handshake().map_err(|e| {
            ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e))
        })?;

        Self::authenticate(&session, &address.user, auth)?;

        // Remote commands run until they finish.
        session.set_timeout(0);

        debug!("SSH connection established successfully");
        Ok(session)
    }

    /// Resolve the address and open a TCP stream with a connect timeout
    fn open_tcp(host: &str, port: u16, timeout: Duration) -> ConnectionResult<TcpStream> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::HostNotFound(format!("{}: {}", host, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    last_error = Some(ConnectionError::Timeout(timeout.as_secs()));
                }
                Err(e) => {
                    trace!(addr = %addr, error = %e, "TCP connect attempt failed");
                    last_error = Some(ConnectionError::ConnectionFailed(format!(
                        "Failed to connect to {}: {}",
                        addr, e
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectionError::HostNotFound(host.to_string())))
    }

    /// Perform SSH authentication
    fn authenticate(session: &Session, user: &str, auth: &AuthMethod) -> ConnectionResult<()> {
        match auth {
            AuthMethod::Password { password } => {
                session.userauth_password(user, password).map_err(|e| {
                    ConnectionError::AuthenticationFailed(format!(
                        "Password authentication failed: {}",
                        e
                    ))
                })?;

                if session.authenticated() {
                    debug!("Authenticated using password");
                    return Ok(());
                }
            }
            AuthMethod::Key {
                private_key,
                passphrase,
            } => {
                let key_path = expand_path(&private_key.to_string_lossy());
                Self::try_key_auth(session, user, &key_path, passphrase.as_deref())?;
                debug!(key = %key_path.display(), "Authenticated using key");
                return Ok(());
            }
            AuthMethod::Agent => {
                match Self::try_agent_auth(session, user) {
                    Ok(()) => {
                        debug!("Authenticated using SSH agent");
                        return Ok(());
                    }
                    Err(e) => warn!(error = %e, "SSH agent authentication failed"),
                }

                // Fall back to the usual key locations
                for key_path in default_identity_files() {
                    if Self::try_key_auth(session, user, &key_path, None).is_ok() {
                        debug!(key = %key_path.display(), "Authenticated using key");
                        return Ok(());
                    }
                }
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "All authentication methods failed".to_string(),
        ))
    }

    /// Try SSH agent authentication
    fn try_agent_auth(session: &Session, user: &str) -> ConnectionResult<()> {
        let mut agent = session.agent().map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("Failed to connect to SSH agent: {}", e))
        })?;

        agent.connect().map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("Failed to connect to SSH agent: {}", e))
        })?;

        agent.list_identities().map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("Failed to list agent identities: {}", e))
        })?;

        for identity in agent.identities().unwrap_or_default() {
            if agent.userauth(user, &identity).is_ok() && session.authenticated() {
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "No suitable agent identity found".to_string(),
        ))
    }

    /// Try key-based authentication
    fn try_key_auth(
        session: &Session,
        user: &str,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> ConnectionResult<()> {
        if !key_path.exists() {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "Key file not found: {}",
                key_path.display()
            )));
        }

        session
            .userauth_pubkey_file(user, None, key_path, passphrase)
            .map_err(|e| {
                ConnectionError::AuthenticationFailed(format!(
                    "Key authentication failed for {}: {}",
                    key_path.display(),
                    e
                ))
            })?;

        if session.authenticated() {
            Ok(())
        } else {
            Err(ConnectionError::AuthenticationFailed(
                "Key authentication failed".to_string(),
            ))
        }
    }

    /// Open a channel, request the current pty and start `command`.
    ///
    /// `stderr` decides what happens to the remote standard error. Unread
    /// stderr stalls the remote process once the channel window fills.
    fn start(&self, command: &str, stderr: ExtendedData) -> ConnectionResult<Channel> {
        let mut channel = self.session.channel_session().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to open channel: {}", e))
        })?;

        channel.handle_extended_data(stderr).map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to configure stderr: {}", e))
        })?;

        if let Some(pty) = self.pty {
            channel.request_pty(pty.term(), None, None).map_err(|e| {
                ConnectionError::ExecutionFailed(format!("Failed to request pty: {}", e))
            })?;
        }

        trace!(command = %command, pty = ?self.pty, "Executing remote command");

        channel.exec(command).map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to execute command: {}", e))
        })?;

        Ok(channel)
    }

    /// Wait for the remote process and return its exit status
    fn finish(mut channel: Channel) -> ConnectionResult<i32> {
        channel.wait_close().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to close channel: {}", e))
        })?;
        let exit_code = channel.exit_status().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to read exit status: {}", e))
        })?;

        trace!(exit_code = %exit_code, "Command completed");
        Ok(exit_code)
    }
}

impl Transport for SshTransport {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn execute(&mut self, command: &str) -> ConnectionResult<i32> {
        // Interleaved with stdout, as a pty would show it.
        let mut channel = self.start(command, ExtendedData::Merge)?;

        let mut stdout = io::stdout().lock();
        io::copy(&mut channel, &mut stdout)?;
        stdout.flush()?;
        drop(stdout);

        Self::finish(channel)
    }

    fn capture(&mut self, command: &str) -> ConnectionResult<CommandResult> {
        // Only stdout is captured; without a pty stderr is dropped remotely.
        let mut channel = self.start(command, ExtendedData::Ignore)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to read stdout: {}", e))
        })?;

        let exit_code = Self::finish(channel)?;
        Ok(CommandResult::from_status(exit_code, stdout))
    }

    fn pty_type(&self) -> Option<PtyType> {
        self.pty
    }

    fn set_pty_type(&mut self, pty: Option<PtyType>) {
        self.pty = pty;
    }

    fn close(&mut self) -> ConnectionResult<()> {
        self.session
            .disconnect(None, "Goodbye", None)
            .map_err(|e| ConnectionError::SshError(format!("Failed to disconnect: {}", e)))
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            trace!(host = %self.identifier, error = %e, "Ignoring disconnect failure");
        }
    }
}

/// libssh2 takes its blocking timeout in milliseconds as a `u32`
fn session_timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}
