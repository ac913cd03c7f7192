//! SSH transport layer wrapping russh.
//!
//! This module provides connection setup, authentication, host key trust,
//! and channel creation. [`Connector`] and [`Connection`] are the seam the
//! command session is written against; [`SshConnector`] is the russh-backed
//! implementation.

pub mod config;
mod ssh;

pub use config::{Endpoint, EndpointBuilder, HostKeyPolicy, SshConfig};
pub use ssh::{ChannelReader, ChannelWriter, SshConnection, SshConnector};

use std::future::Future;

use crate::channel::{CommandSink, ShellMode, ShellReader};
use crate::error::Result;

/// Establishes authenticated connections to an endpoint.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Connect and authenticate. No retry is attempted.
    fn connect(&self, endpoint: &Endpoint)
    -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// One live, authenticated connection.
pub trait Connection: Send {
    type Sink: CommandSink;
    type Reader: ShellReader;

    /// Open a channel and start `mode` on it.
    fn open_shell(
        &mut self,
        mode: &ShellMode,
    ) -> impl Future<Output = Result<(Self::Sink, Self::Reader)>> + Send;

    /// Close the connection.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
