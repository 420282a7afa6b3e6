//! Result and connection types for a single host

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::keys::KeySource;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turn a non-zero exit into `ExecError::CommandFailed`
    ///
    /// # Errors
    /// Returns `CommandFailed` with the status and stderr when the command failed
    pub fn into_checked(self) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                status: self.status,
                stderr: self.stderr,
            })
        }
    }
}

/// Attributes of a file written on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Remote path of the uploaded file
    pub path: String,
    /// Size reported by the remote side after upload
    pub size: Option<u64>,
    /// Permission bits (masked to `0o7777`) after upload
    pub mode: Option<u32>,
}

/// How to authenticate against a host
#[derive(Clone)]
pub enum Auth {
    /// Plain password authentication
    Password(String),
    /// Private key authentication
    Key(KeySource),
}

impl Auth {
    /// Short label safe to put in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::Password(_) => "password",
            Auth::Key(_) => "key",
        }
    }

    /// Printable reference to the credential; passwords are always redacted
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Auth::Password(_) => "<redacted>".to_string(),
            Auth::Key(source) => source.to_string(),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(<redacted>)"),
            Auth::Key(source) => f.debug_tuple("Key").field(source).finish(),
        }
    }
}

/// Connection information for SSH
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Username
    pub user: String,
    /// Credentials
    pub auth: Auth,
    /// Give up on the TCP + handshake phase after this long
    pub connect_timeout: Option<Duration>,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: Auth) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            auth,
            connect_timeout: None,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
