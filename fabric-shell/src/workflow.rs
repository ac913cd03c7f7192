//! Hostname lifecycle workflow.
//!
//! Maps create/read/update/delete onto command scripts. Every operation
//! opens its own connection and session; nothing is pooled. State is only
//! produced after a session has reached `Succeeded`, so a failed operation
//! never yields a value for the caller to persist.

use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::channel::ShellMode;
use crate::error::{Result, WorkflowError};
use crate::extract::{ExtractionResult, extract_sys_name};
use crate::session::{
    CommandScript, CommandSession, SHOW_SYS_INFO, SessionConfig, SessionOutcome,
    validate_hostname,
};
use crate::transport::{Connector, Endpoint};

/// Persisted hostname resource state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostnameState {
    /// Resource identifier; always the hostname.
    pub id: String,

    /// Hostname applied to or observed on the device.
    pub hostname: String,
}

impl HostnameState {
    /// State for `hostname`, keyed by the hostname itself.
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        Self {
            id: hostname.clone(),
            hostname,
        }
    }
}

/// How the hostname is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// One non-interactive `show sys-info` execution.
    #[default]
    Exec,

    /// `enable`, `show sys-info`, `exit` in an interactive shell.
    Interactive,
}

/// Policy for reads whose output has no `SysName` line.
#[derive(Debug, Clone, Default)]
pub struct ReadPolicy {
    /// Fail once this many consecutive reads miss. `None` keeps every miss
    /// a warning.
    pub max_consecutive_misses: Option<u32>,

    pub query_mode: QueryMode,
}

impl ReadPolicy {
    /// Fail the `max`-th consecutive read without a `SysName`.
    pub fn with_max_consecutive_misses(mut self, max: u32) -> Self {
        self.max_consecutive_misses = Some(max);
        self
    }

    /// Choose how the hostname is queried.
    pub fn with_query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = mode;
        self
    }
}

/// Drives the hostname of one device.
pub struct HostnameClient<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    session_config: SessionConfig,
    read_policy: ReadPolicy,
    misses: AtomicU32,
}

impl<C: Connector> HostnameClient<C> {
    /// Create a client with default session and read settings.
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            session_config: SessionConfig::default(),
            read_policy: ReadPolicy::default(),
            misses: AtomicU32::new(0),
        }
    }

    /// Settings applied to every session this client opens.
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Replace the read policy.
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// The device this client drives.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Consecutive reads that found no `SysName`.
    pub fn consecutive_misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Set the hostname.
    pub async fn create(&self, hostname: &str) -> Result<HostnameState> {
        let script = CommandScript::set_hostname(hostname)?;
        self.run(&ShellMode::Interactive, &script).await?;
        debug!("hostname of {} set to {}", self.endpoint.host(), hostname);
        Ok(HostnameState::new(hostname))
    }

    /// Query the device and extract the reported system name.
    pub async fn observe(&self) -> Result<ExtractionResult> {
        let (mode, script) = match self.read_policy.query_mode {
            QueryMode::Exec => (
                ShellMode::Exec(SHOW_SYS_INFO.to_string()),
                CommandScript::builder("query hostname").build(),
            ),
            QueryMode::Interactive => (ShellMode::Interactive, CommandScript::query_hostname()),
        };
        let outcome = self.run(&mode, &script).await?;
        Ok(extract_sys_name(&outcome.output))
    }

    /// Refresh `prior` from the device.
    ///
    /// When the output has no `SysName`, a warning is logged and `prior` is
    /// returned unchanged, unless the read policy's miss limit is reached.
    pub async fn read(&self, prior: &HostnameState) -> Result<HostnameState> {
        match self.observe().await?.into_value() {
            Some(hostname) => {
                self.misses.store(0, Ordering::Relaxed);
                Ok(HostnameState::new(hostname))
            }
            None => {
                let attempts = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Hostname not found: could not parse SysName from show sys-info output \
                     ({} consecutive)",
                    attempts
                );
                match self.read_policy.max_consecutive_misses {
                    Some(max) if attempts >= max => {
                        Err(WorkflowError::HostnameNotFound { attempts }.into())
                    }
                    _ => Ok(prior.clone()),
                }
            }
        }
    }

    /// Apply `hostname` if it differs from `state`; no session otherwise.
    pub async fn update(&self, hostname: &str, state: &HostnameState) -> Result<HostnameState> {
        validate_hostname(hostname)?;
        if hostname == state.hostname {
            debug!("hostname unchanged ({}), nothing to do", hostname);
            return Ok(state.clone());
        }
        self.create(hostname).await
    }

    /// Reset the hostname to the default.
    pub async fn delete(&self, state: &HostnameState) -> Result<()> {
        debug!("resetting hostname {} to default", state.hostname);
        self.run(&ShellMode::Interactive, &CommandScript::reset_hostname())
            .await?;
        Ok(())
    }

    async fn run(&self, mode: &ShellMode, script: &CommandScript) -> Result<SessionOutcome> {
        let connection = self.connector.connect(&self.endpoint).await?;
        CommandSession::execute(connection, mode, script, &self.session_config).await
    }
}
