//! Channel layer: the transport-neutral shell I/O seam, the shared output
//! buffer, and the drain task that fills it.

mod buffer;
mod drain;

pub use buffer::{LineAssembler, OutputBuffer, SharedOutput};
pub use drain::{DrainHandle, Termination, spawn_drain};

use std::future::Future;
use std::io;

use bytes::Bytes;

/// One event read from a remote shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Bytes on the primary output stream.
    Stdout(Bytes),

    /// Bytes on the auxiliary (extended data) stream.
    Stderr(Bytes),

    /// The remote process reported an exit status.
    ExitStatus(u32),

    /// The remote process was killed by a signal.
    ExitSignal { signal: String, message: String },

    /// The remote will send no more data.
    Eof,

    /// The channel was closed.
    Closed,
}

/// Read half of a shell channel, owned by the drain task.
pub trait ShellReader: Send + 'static {
    /// Wait for the next event. `None` means the channel is gone.
    ///
    /// Must be cancel-safe: the drain task races it against a stop request,
    /// and an event must not be lost when the future is dropped.
    fn next_event(&mut self) -> impl Future<Output = Option<ShellEvent>> + Send;

    /// Take the next event the remote has already delivered, without waiting
    /// for new traffic. `None` when nothing is queued.
    fn try_next_event(&mut self) -> impl Future<Output = Option<ShellEvent>> + Send;
}

/// Write half of a shell channel, owned by the command session.
pub trait CommandSink: Send {
    /// Write `line` followed by a line terminator.
    fn write_line(&mut self, line: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Signal that no further input will be written.
    fn finish(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// What to start on a freshly opened channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    /// PTY plus interactive shell; commands are written line by line.
    Interactive,

    /// One non-interactive command execution; nothing is written.
    Exec(String),
}
