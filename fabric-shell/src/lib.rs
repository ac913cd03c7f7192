//! # fabric-shell
//!
//! Async SSH command-session automation for Fabric Engine switches.
//!
//! The device only offers an interactive, line-based CLI. This crate opens
//! an SSH channel, writes a fixed command script, drains stdout and stderr
//! concurrently into a synchronized buffer, classifies how the remote shell
//! ended, and pulls fields such as `SysName` out of the captured text.
//!
//! ## Layers
//!
//! - [`transport`]: russh connection, authentication, host key policy
//! - [`channel`]: shell I/O seam, output buffer, drain task
//! - [`session`]: command scripts and the command session
//! - [`extract`]: `Label : token` field extraction
//! - [`workflow`]: create/read/update/delete of the device hostname
//!
//! ## Quick Start
//!
//! `SshConfig::default()` trusts only host keys already in
//! `~/.ssh/known_hosts`; a switch missing from that file is rejected with
//! [`TransportError::HostKeyUnknown`](error::TransportError::HostKeyUnknown).
//! Pin its key with [`HostKeyPolicy::Pinned`], or opt in to
//! [`HostKeyPolicy::InsecureAcceptAny`] for lab devices.
//!
//! ```rust,no_run
//! use fabric_shell::transport::{EndpointBuilder, SshConfig, SshConnector};
//! use fabric_shell::workflow::HostnameClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fabric_shell::Error> {
//!     // EXTRM_FE_HOST, EXTRM_FE_USERNAME, EXTRM_FE_PASSWORD
//!     let endpoint = EndpointBuilder::new().build()?;
//!     // strict known_hosts checking; see above for lab switches
//!     let client = HostnameClient::new(SshConnector::new(SshConfig::default()), endpoint);
//!
//!     let state = client.create("LAB-VOSS01").await?;
//!     let state = client.read(&state).await?;
//!     println!("{}", state.hostname);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod extract;
pub mod session;
pub mod transport;
pub mod workflow;

// Re-export main types for convenience
pub use error::{Error, ErrorKind, Result};
pub use extract::{ExtractionResult, Extractor, extract_sys_name};
pub use session::{CommandScript, CommandSession, SessionConfig, SessionOutcome, SessionState};
pub use transport::{Endpoint, EndpointBuilder, HostKeyPolicy, SshConfig, SshConnector};
pub use workflow::{HostnameClient, HostnameState, QueryMode, ReadPolicy};
