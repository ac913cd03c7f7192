//! Endpoint and SSH connection configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Environment variable consulted for the device host.
pub const ENV_HOST: &str = "EXTRM_FE_HOST";
/// Environment variable consulted for the SSH port.
pub const ENV_PORT: &str = "EXTRM_FE_PORT";
/// Environment variable consulted for the username.
pub const ENV_USERNAME: &str = "EXTRM_FE_USERNAME";
/// Environment variable consulted for the password.
pub const ENV_PASSWORD: &str = "EXTRM_FE_PASSWORD";

/// Connection target and credentials for one device.
///
/// Validated on construction and immutable afterwards. The secret is held
/// in a [`SecretString`] so it never shows up in `Debug` output.
#[derive(Debug)]
pub struct Endpoint {
    host: String,
    port: u16,
    username: String,
    secret: SecretString,
}

impl Endpoint {
    /// Build an endpoint, rejecting empty fields and port 0.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let host = host.into();
        let username = username.into();
        let secret = secret.into();

        if host.trim().is_empty() {
            return Err(ConfigError::Missing { field: "host" });
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort {
                value: port.to_string(),
            });
        }
        if username.is_empty() {
            return Err(ConfigError::Missing { field: "username" });
        }
        if secret.is_empty() {
            return Err(ConfigError::Missing { field: "password" });
        }

        Ok(Self {
            host,
            port,
            username,
            secret: SecretString::from(secret),
        })
    }

    /// Hostname or IP address of the device.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// SSH port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Expose the password for authentication.
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// `host:port` form used in log and error messages.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder resolving each endpoint field from an explicit value first and
/// from the `EXTRM_FE_*` environment variables second.
///
/// # Example
///
/// ```rust
/// use fabric_shell::transport::EndpointBuilder;
///
/// let endpoint = EndpointBuilder::new()
///     .host("10.0.0.10")
///     .username("rwa")
///     .password("rwa")
///     .build_with(|_| None)
///     .unwrap();
/// assert_eq!(endpoint.port(), 22);
/// ```
#[derive(Debug, Default)]
pub struct EndpointBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

impl EndpointBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host, overriding `EXTRM_FE_HOST`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port, overriding `EXTRM_FE_PORT`.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the user, overriding `EXTRM_FE_USERNAME`.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password, overriding `EXTRM_FE_PASSWORD`.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Resolve against the process environment.
    pub fn build(self) -> Result<Endpoint, ConfigError> {
        self.build_with(|key| env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn build_with<F>(self, lookup: F) -> Result<Endpoint, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = self.host.or_else(|| lookup(ENV_HOST)).unwrap_or_default();
        let username = self
            .username
            .or_else(|| lookup(ENV_USERNAME))
            .unwrap_or_default();
        let password = self
            .password
            .or_else(|| lookup(ENV_PASSWORD))
            .unwrap_or_default();

        let port = match self.port {
            Some(port) => port,
            None => match lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort { value: raw })?,
                None => 22,
            },
        };

        Endpoint::new(host, port, username, password)
    }
}

/// How the remote host key is trusted.
#[derive(Debug, Clone)]
pub enum HostKeyPolicy {
    /// Accept any key without checking. Lab use only; every connection
    /// logs a warning.
    InsecureAcceptAny,

    /// Require the key to already be in known_hosts. Unknown and changed
    /// keys are rejected.
    KnownHosts {
        /// Alternate known_hosts file; `~/.ssh/known_hosts` when `None`.
        path: Option<PathBuf>,
    },

    /// Require the key's SHA-256 fingerprint (`SHA256:...`) to match.
    Pinned { fingerprint: String },
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::KnownHosts { path: None }
    }
}

/// SSH connection configuration shared by every session the connector opens.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Connect and inactivity timeout.
    pub timeout: Duration,

    /// Terminal width for the PTY.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,

    /// Host key trust policy.
    pub host_key_policy: HostKeyPolicy,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

impl SshConfig {
    /// Replace the host key policy.
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Replace the connection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
