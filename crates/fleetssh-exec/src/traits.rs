//! Per-host transport trait

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, RemoteFile};

/// One authenticated session to one host
///
/// Implementations must be safe to share behind an `Arc` and are driven by
/// at most one fan-out work item at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the session; a no-op when already connected
    async fn connect(&self) -> Result<(), ExecError>;

    /// Run `cmd`, returning stdout, stderr and exit status
    async fn run(&self, cmd: &str, timeout: Option<Duration>) -> Result<CommandResult, ExecError>;

    /// Upload one file
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<RemoteFile, ExecError>;

    /// Upload a directory tree below `remote_path`
    async fn put_dir(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<Vec<RemoteFile>, ExecError>;

    /// Create a remote directory
    async fn mkdir(&self, path: &str) -> Result<(), ExecError>;

    /// Delete a remote file
    async fn delete_file(&self, path: &str) -> Result<bool, ExecError>;

    /// Delete a remote directory; `force` removes it recursively
    ///
    /// A failed recursive delete is `ExecError::CommandFailed` carrying its stderr.
    async fn delete_dir(
        &self,
        path: &str,
        force: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, ExecError>;

    /// Release the session
    async fn close(&self) -> Result<(), ExecError>;

    /// Get transport type for logging
    fn transport_type(&self) -> &'static str;
}

/// Permission bits to apply after an upload, if any
///
/// `mode` wins unless it is absent or `mirror_local_mode` is set, in which
/// case the local file's mode is used.
#[must_use]
pub fn desired_mode(mode: Option<u32>, mirror_local_mode: bool, local_mode: u32) -> Option<u32> {
    if mode.is_none() && !mirror_local_mode {
        return None;
    }
    let wanted = match mode {
        Some(mode) if !mirror_local_mode => mode,
        _ => local_mode,
    };
    Some(wanted & 0o7777)
}

/// Remote directory that mirrors `local_dir` below `remote_base`
///
/// `/srv/app/` and `/srv/app` both map to `<remote_base>/app`.
#[must_use]
pub fn remote_root(local_dir: &Path, remote_base: &str) -> String {
    let base = remote_base.trim_end_matches('/');
    match local_dir.file_name() {
        Some(name) => format!("{base}/{}", name.to_string_lossy()),
        None => base.to_string(),
    }
}
