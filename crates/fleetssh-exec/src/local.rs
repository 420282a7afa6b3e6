//! Local transport using `tokio::process` and `tokio::fs`

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::{CommandResult, RemoteFile};
use crate::shell;
use crate::traits::{Transport, desired_mode, remote_root};

/// Local transport
///
/// Serves `localhost` entries of a fleet without an SSH round trip.
#[derive(Debug, Clone)]
pub struct LocalTransport;

impl LocalTransport {
    /// Create a new local transport
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Internal method to execute command
    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, "executing local command");

        // Use shell to support pipes, redirections, etc.
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child.wait_with_output().await?;

        let duration = start.elapsed();

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "command completed"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    async fn stat(path: &Path) -> Result<RemoteFile, ExecError> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(RemoteFile {
            path: path.display().to_string(),
            size: Some(metadata.len()),
            mode: Some(metadata.permissions().mode() & 0o7777),
        })
    }

    fn copy_tree<'a>(
        &'a self,
        local_dir: &'a Path,
        remote_dir: &'a Path,
        mode: Option<u32>,
        mirror_local_mode: bool,
        copied: &'a mut Vec<RemoteFile>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>> {
        Box::pin(async move {
            if !tokio::fs::try_exists(remote_dir).await? {
                tokio::fs::create_dir(remote_dir).await?;
            }

            let mut entries = tokio::fs::read_dir(local_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let target = remote_dir.join(entry.file_name());
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    self.copy_tree(&path, &target, mode, mirror_local_mode, copied)
                        .await?;
                } else if file_type.is_file() {
                    let target = target.to_string_lossy();
                    copied.push(self.put(&path, &target, mode, mirror_local_mode).await?);
                }
            }
            Ok(())
        })
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &str, limit: Option<Duration>) -> Result<CommandResult, ExecError> {
        let Some(timeout_duration) = limit else {
            return self.execute(cmd).await;
        };

        let start = Instant::now();

        debug!(command = %cmd, timeout = ?timeout_duration, "executing with timeout");

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<RemoteFile, ExecError> {
        let target = Path::new(remote_path);
        tokio::fs::copy(local_path, target).await?;

        let local_mode = tokio::fs::metadata(local_path).await?.permissions().mode();
        let mut copied = Self::stat(target).await?;
        if let Some(wanted) = desired_mode(mode, mirror_local_mode, local_mode)
            && copied.mode != Some(wanted)
        {
            tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(wanted)).await?;
            copied.mode = Some(wanted);
        }
        Ok(copied)
    }

    #[instrument(skip(self), level = "debug")]
    async fn put_dir(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<Vec<RemoteFile>, ExecError> {
        let root = remote_root(local_path, remote_path);
        let mut copied = Vec::new();
        self.copy_tree(
            local_path,
            Path::new(&root),
            mode,
            mirror_local_mode,
            &mut copied,
        )
        .await?;
        Ok(copied)
    }

    async fn mkdir(&self, path: &str) -> Result<(), ExecError> {
        debug!(path = %path, "mkdir");
        tokio::fs::create_dir(path).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<bool, ExecError> {
        debug!(path = %path, "deleting file");
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }

    async fn delete_dir(
        &self,
        path: &str,
        force: bool,
        limit: Option<Duration>,
    ) -> Result<bool, ExecError> {
        if force {
            let command = format!("rm -rf {}", shell::quote(path));
            debug!(path = %path, command = %command, "deleting dir");
            self.run(&command, limit).await?.into_checked()?;
            return Ok(true);
        }

        debug!(path = %path, "deleting dir");
        tokio::fs::remove_dir(path).await?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "local"
    }
}
