//! Client configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetssh_exec::{Auth, KeySource};

use crate::error::CoreError;

/// Default SSH port used when a specifier carries none
pub const DEFAULT_PORT: u16 = 22;

/// Default number of in-flight host operations
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Immutable settings of one `ParallelClient`
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host specifiers (`host` or `host:port`)
    pub hosts: Vec<String>,
    /// SSH user (defaults to root)
    #[serde(default = "default_user")]
    pub user: String,
    /// Password; takes precedence over any key when set
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Path to an SSH private key
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Environment variable holding a base64 private key
    #[serde(default)]
    pub private_key_env: Option<String>,
    /// Port for specifiers without one
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of hosts worked on at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Connect timeout in milliseconds
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Propagate the first connect failure instead of recording it
    #[serde(default)]
    pub raise_on_connect_error: bool,
    /// Connect to every host while constructing the client
    #[serde(default = "default_connect")]
    pub connect_on_construct: bool,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_connect() -> bool {
    true
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("hosts", &self.hosts)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("private_key_env", &self.private_key_env)
            .field("port", &self.port)
            .field("concurrency", &self.concurrency)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("raise_on_connect_error", &self.raise_on_connect_error)
            .field("connect_on_construct", &self.connect_on_construct)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config for `hosts` with defaults everywhere else
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            user: default_user(),
            password: None,
            private_key: None,
            private_key_env: None,
            port: DEFAULT_PORT,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_ms: None,
            raise_on_connect_error: false,
            connect_on_construct: true,
        }
    }

    /// Set SSH user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Authenticate with a password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authenticate with a private key file
    #[must_use]
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Authenticate with a base64 private key from an environment variable
    #[must_use]
    pub fn with_private_key_env(mut self, var: impl Into<String>) -> Self {
        self.private_key_env = Some(var.into());
        self
    }

    /// Set default port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set concurrency bound
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Propagate connect failures instead of recording bad hosts
    #[must_use]
    pub fn with_raise_on_connect_error(mut self, raise: bool) -> Self {
        self.raise_on_connect_error = raise;
        self
    }

    /// Whether construction connects eagerly
    #[must_use]
    pub fn with_connect_on_construct(mut self, connect: bool) -> Self {
        self.connect_on_construct = connect;
        self
    }

    /// Connect timeout as a duration
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Credentials to hand to a transport
    ///
    /// A password wins over key material.
    ///
    /// # Errors
    /// Returns `CoreError::ConfigError` when no credential is configured
    pub fn auth(&self) -> Result<Auth, CoreError> {
        if let Some(password) = &self.password {
            return Ok(Auth::Password(password.clone()));
        }
        if let Some(path) = &self.private_key {
            return Ok(Auth::Key(KeySource::Path(path.clone())));
        }
        if let Some(var) = &self.private_key_env {
            return Ok(Auth::Key(KeySource::Env(var.clone())));
        }
        Err(CoreError::ConfigError(
            "no password or private key configured".to_string(),
        ))
    }
}
