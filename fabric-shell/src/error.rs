//! Error types for fabric-shell.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for fabric-shell operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid endpoint or workflow input
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Hostname workflow errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Coarse classification of every error the crate can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidConfig,
    ConnectionFailed,
    SessionOpenFailed,
    WriteFailed,
    ScriptStepFailed,
    TerminationFailed,
    DeadlineExceeded,
    HostnameNotFound,
    /// A session operation was called in a state that does not allow it.
    IllegalTransition,
}

impl Error {
    /// Map this error onto the flat taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::InvalidConfig,
            Error::Transport(_) => ErrorKind::ConnectionFailed,
            Error::Session(e) => e.kind(),
            Error::Workflow(WorkflowError::HostnameNotFound { .. }) => ErrorKind::HostnameNotFound,
        }
    }

    /// Output captured from the remote shell before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::Session(e) => e.output(),
            _ => None,
        }
    }
}

/// Endpoint and input validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field was empty or missing from both config and environment
    #[error("{field} cannot be empty")]
    Missing { field: &'static str },

    /// Port outside 1..=65535 or not a number
    #[error("Invalid port '{value}'")]
    InvalidPort { value: String },

    /// Hostname value that cannot be sent as a single CLI token
    #[error("Invalid hostname '{value}': {reason}")]
    InvalidHostname { value: String, reason: &'static str },
}

/// Transport layer errors (SSH connection, authentication, host key).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to reach or negotiate with the host
    #[error("Connection failed to {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication rejected
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key not present in known_hosts (strict policy)
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host key does not match the pinned fingerprint
    #[error("Host key fingerprint {actual} does not match pinned {expected}")]
    HostKeyMismatch { expected: String, actual: String },

    /// known_hosts could not be read
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection attempt timed out
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Command session errors. Every variant raised after the shell started
/// carries the output drained so far.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Channel could not be opened or the pty/shell/exec request was refused
    #[error("Failed to open session: {message}")]
    OpenFailed { message: String },

    /// A line could not be written to the remote shell
    #[error("Failed to write '{command}': {source}")]
    WriteFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A script step could not be sent; later steps were not attempted
    #[error("Failed to {label}: {source}\noutput:\n{output}")]
    ScriptStepFailed {
        label: String,
        #[source]
        source: io::Error,
        output: String,
    },

    /// The remote shell ended with a non-benign termination report
    #[error("Command sequence failed: {reason}\noutput:\n{output}")]
    TerminationFailed { reason: String, output: String },

    /// The operation deadline passed; the connection was dropped
    #[error("Deadline of {deadline:?} exceeded while {stage}\noutput:\n{output}")]
    DeadlineExceeded {
        deadline: Duration,
        stage: &'static str,
        output: String,
    },

    /// The session was driven out of order
    #[error("Illegal session transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl SessionError {
    /// Taxonomy kind for this session error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::OpenFailed { .. } => ErrorKind::SessionOpenFailed,
            SessionError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            SessionError::WriteFailed { .. } => ErrorKind::WriteFailed,
            SessionError::ScriptStepFailed { .. } => ErrorKind::ScriptStepFailed,
            SessionError::TerminationFailed { .. } => ErrorKind::TerminationFailed,
            SessionError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }

    /// Attached diagnostics output.
    pub fn output(&self) -> Option<&str> {
        match self {
            SessionError::ScriptStepFailed { output, .. }
            | SessionError::TerminationFailed { output, .. }
            | SessionError::DeadlineExceeded { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Workflow-level errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// SysName was missing from the query output too many times in a row
    #[error("SysName not found in show sys-info output after {attempts} consecutive attempts")]
    HostnameNotFound { attempts: u32 },
}

/// Result type alias using fabric-shell's Error.
pub type Result<T> = std::result::Result<T, Error>;
