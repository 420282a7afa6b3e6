//! Error types for fleetssh-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a single host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command exited with a status the caller treats as fatal
    #[error("command execution failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command didn't finish in {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution or transfer
    #[error("I/O error: {0}")]
    Io(String),

    /// SFTP subsystem error
    #[error("SFTP error: {0}")]
    Sftp(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl ExecError {
    /// Check if error happened before a session existed
    #[must_use]
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
        )
    }
}

impl From<std::io::Error> for ExecError {
    fn from(err: std::io::Error) -> Self {
        ExecError::Io(err.to_string())
    }
}

impl From<russh::Error> for ExecError {
    fn from(err: russh::Error) -> Self {
        ExecError::ConnectionFailed(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for ExecError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        ExecError::Sftp(err.to_string())
    }
}
