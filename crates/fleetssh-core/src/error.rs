//! Core error types for fleetssh-core
//!
//! Only configuration errors and explicitly requested connect failures
//! surface here. Per-host failures never do: they become `ErrorRecord`s.

use std::path::PathBuf;

use thiserror::Error;

use fleetssh_exec::ExecError;

/// Errors that abort a whole client call
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Client constructed without any host
    #[error("need a non-empty list of hosts to talk to")]
    NoHosts,

    /// Host specifier could not be parsed
    #[error("invalid host specifier {spec:?}: {reason}")]
    InvalidHost {
        /// Specifier as given by the caller
        spec: String,
        /// What is wrong with it
        reason: String,
    },

    /// Same hostname listed twice
    #[error("host listed more than once: {0}")]
    DuplicateHost(String),

    /// Source of an upload does not exist locally
    #[error("local path {} does not exist", .0.display())]
    LocalPathNotFound(PathBuf),

    /// Connecting failed and the caller asked for failures to propagate
    #[error("failed connecting to host {host}: {source}")]
    Connect {
        /// Hostname that failed
        host: String,
        /// Underlying transport error
        source: ExecError,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CoreError {
    pub(crate) fn invalid_host(spec: &str, reason: impl Into<String>) -> Self {
        CoreError::InvalidHost {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}
