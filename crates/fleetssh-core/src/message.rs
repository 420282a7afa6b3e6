//! Message types for `FleetActor`
//!
//! Handlers live in `actor::fleet`.

use std::path::PathBuf;
use std::time::Duration;

use kameo_macros::Reply;

use crate::registry::HostSummary;

/// Connect to every host; live sessions are reused
#[derive(Debug, Clone, Copy)]
pub struct Connect {
    /// Propagate the first failure instead of recording it
    pub raise_on_error: bool,
}

/// Run a shell command on every live host
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub cmd: String,
    pub timeout: Option<Duration>,
    /// Working directory the command is run from
    pub cwd: Option<String>,
}

/// Upload a local file or directory tree
#[derive(Debug, Clone)]
pub struct PutFiles {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Octal mode applied after upload
    pub mode: Option<u32>,
    /// Copy the local file's mode
    pub mirror_local_mode: bool,
}

/// Create a directory
#[derive(Debug, Clone)]
pub struct MakeDir {
    pub path: String,
}

/// Delete a file
#[derive(Debug, Clone)]
pub struct DeleteFile {
    pub path: String,
}

/// Delete a directory, recursively when `force` is set
#[derive(Debug, Clone)]
pub struct DeleteDir {
    pub path: String,
    pub force: bool,
    pub timeout: Option<Duration>,
}

/// List every configured host with its connection state
#[derive(Debug, Clone, Copy)]
pub struct ListHosts;

/// Reply to `ListHosts`, in configuration order
#[derive(Debug, Clone, Reply)]
pub struct FleetInventory {
    pub hosts: Vec<HostSummary>,
}
