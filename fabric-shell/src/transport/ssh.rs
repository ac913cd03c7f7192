//! SSH transport implementation using russh.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{HashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::config::{Endpoint, HostKeyPolicy, SshConfig};
use super::{Connection, Connector};
use crate::channel::{CommandSink, ShellEvent, ShellMode, ShellReader};
use crate::error::{Result, SessionError, TransportError};

/// Connects to devices over SSH with password authentication.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector using `config` for every connection.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// The SSH settings in use.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<SshConnection> {
        SshConnection::connect(&self.config, endpoint).await
    }
}

/// One authenticated SSH connection.
pub struct SshConnection {
    /// The russh session handle.
    session: Handle<SshHandler>,

    terminal_width: u32,
    terminal_height: u32,
}

impl SshConnection {
    /// Connect to the SSH server and authenticate with the endpoint's password.
    pub async fn connect(config: &SshConfig, endpoint: &Endpoint) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            policy: config.host_key_policy.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {}", endpoint.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (endpoint.host(), endpoint.port()), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed reason recorded by check_server_key over
            // the generic russh::Error::UnknownKey
            let stored = host_key_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            stored.unwrap_or_else(|| TransportError::ConnectionFailed {
                host: endpoint.host().to_string(),
                port: endpoint.port(),
                message: e.to_string(),
            })
        })?;

        let authenticated = session
            .authenticate_password(endpoint.username(), endpoint.secret())
            .await
            .map_err(TransportError::Ssh)?
            .success();

        if !authenticated {
            return Err(TransportError::AuthenticationFailed {
                user: endpoint.username().to_string(),
            }
            .into());
        }

        debug!(
            "authenticated to {} as {}",
            endpoint.socket_addr(),
            endpoint.username()
        );

        Ok(Self {
            session,
            terminal_width: config.terminal_width,
            terminal_height: config.terminal_height,
        })
    }
}

impl Connection for SshConnection {
    type Sink = ChannelWriter;
    type Reader = ChannelReader;

    async fn open_shell(&mut self, mode: &ShellMode) -> Result<(ChannelWriter, ChannelReader)> {
        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| open_failed(format!("channel open: {}", e)))?;

        let mut pending = VecDeque::new();

        match mode {
            ShellMode::Interactive => {
                channel
                    .request_pty(
                        true,
                        "xterm",
                        self.terminal_width,
                        self.terminal_height,
                        0,
                        0,
                        &[],
                    )
                    .await
                    .map_err(|e| open_failed(format!("pty request: {}", e)))?;
                await_reply(&mut channel, "pty", &mut pending).await?;

                channel
                    .request_shell(true)
                    .await
                    .map_err(|e| open_failed(format!("shell request: {}", e)))?;
                await_reply(&mut channel, "shell", &mut pending).await?;
            }
            ShellMode::Exec(command) => {
                channel
                    .exec(true, command.as_str())
                    .await
                    .map_err(|e| open_failed(format!("exec request: {}", e)))?;
                await_reply(&mut channel, "exec", &mut pending).await?;
            }
        }

        let writer = ChannelWriter {
            inner: Box::pin(channel.make_writer()),
        };
        let reader = ChannelReader { channel, pending };
        Ok((writer, reader))
    }

    async fn close(self) -> Result<()> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

fn open_failed(message: String) -> crate::Error {
    SessionError::OpenFailed { message }.into()
}

/// Wait for the answer to a `want_reply` channel request. Output that
/// arrives first is kept for the drain task.
async fn await_reply(
    channel: &mut Channel<Msg>,
    what: &str,
    pending: &mut VecDeque<ShellEvent>,
) -> Result<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(open_failed(format!("remote refused {} request", what)));
            }
            Some(msg) => {
                if let Some(event) = to_event(msg) {
                    if event == ShellEvent::Closed {
                        return Err(open_failed(format!(
                            "channel closed before {} request was answered",
                            what
                        )));
                    }
                    pending.push_back(event);
                }
            }
            None => {
                return Err(open_failed(format!(
                    "connection lost before {} request was answered",
                    what
                )));
            }
        }
    }
}

fn to_event(msg: ChannelMsg) -> Option<ShellEvent> {
    match msg {
        ChannelMsg::Data { data } => Some(ShellEvent::Stdout(Bytes::copy_from_slice(&data))),
        ChannelMsg::ExtendedData { data, .. } => {
            Some(ShellEvent::Stderr(Bytes::copy_from_slice(&data)))
        }
        ChannelMsg::ExitStatus { exit_status } => Some(ShellEvent::ExitStatus(exit_status)),
        ChannelMsg::ExitSignal {
            signal_name,
            error_message,
            ..
        } => Some(ShellEvent::ExitSignal {
            signal: format!("{:?}", signal_name),
            message: error_message,
        }),
        ChannelMsg::Eof => Some(ShellEvent::Eof),
        ChannelMsg::Close => Some(ShellEvent::Closed),
        _ => None,
    }
}

/// Read half of an SSH channel.
pub struct ChannelReader {
    channel: Channel<Msg>,
    pending: VecDeque<ShellEvent>,
}

impl ShellReader for ChannelReader {
    async fn next_event(&mut self) -> Option<ShellEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        // Channel::wait is a queue receive, so dropping it loses nothing
        loop {
            let msg = self.channel.wait().await?;
            if let Some(event) = to_event(msg) {
                return Some(event);
            }
        }
    }

    async fn try_next_event(&mut self) -> Option<ShellEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        // a zero timeout polls the channel queue once without waiting
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::ZERO, self.channel.wait()).await {
            if let Some(event) = to_event(msg) {
                return Some(event);
            }
        }
        None
    }
}

/// Write half of an SSH channel.
pub struct ChannelWriter {
    inner: Pin<Box<dyn AsyncWrite + Send>>,
}

impl CommandSink for ChannelWriter {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.inner.write_all(&data).await?;
        self.inner.flush().await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Detailed host-key error for connect() to surface instead of the
    /// generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn check_known_hosts(
        &self,
        pubkey: &PublicKey,
        path: Option<&PathBuf>,
    ) -> std::result::Result<(), TransportError> {
        let result = match path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            }),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn reject(&self, error: TransportError) -> bool {
        *self
            .host_key_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match &self.policy {
            HostKeyPolicy::InsecureAcceptAny => {
                warn!(
                    "accepting host key for {}:{} without verification",
                    self.host, self.port
                );
                Ok(true)
            }
            HostKeyPolicy::KnownHosts { path } => {
                match self.check_known_hosts(server_public_key, path.as_ref()) {
                    Ok(()) => Ok(true),
                    Err(e) => Ok(self.reject(e)),
                }
            }
            HostKeyPolicy::Pinned { fingerprint } => {
                let actual = server_public_key.fingerprint(HashAlg::Sha256).to_string();
                if actual == *fingerprint {
                    Ok(true)
                } else {
                    Ok(self.reject(TransportError::HostKeyMismatch {
                        expected: fingerprint.clone(),
                        actual,
                    }))
                }
            }
        }
    }
}
