//! SSH transport using russh and russh-sftp

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::error::ExecError;
use crate::keys::KeySource;
use crate::result::{Auth, CommandResult, ConnectionInfo, RemoteFile};
use crate::shell;
use crate::traits::{Transport, desired_mode, remote_root};

type Session = client::Handle<SshClientHandler>;

/// SSH client handler for russh
#[derive(Debug)]
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// SSH transport
///
/// Owns one authenticated session to one host. File operations open a
/// fresh SFTP subsystem channel on that session.
pub struct SshTransport {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// SSH session (set by `connect`)
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("conn_info", &self.conn_info)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshTransport {
    /// Create a new, unconnected SSH transport
    #[must_use]
    pub fn new(conn_info: ConnectionInfo) -> Self {
        Self {
            conn_info,
            session: Mutex::new(None),
        }
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    /// Whether a session is currently held
    ///
    /// Only a hint: the remote side may have dropped the session since.
    pub fn is_connected(&self) -> bool {
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    async fn authenticate(&self, session: &mut Session) -> Result<(), ExecError> {
        let user = &self.conn_info.user;

        let auth_res = match &self.conn_info.auth {
            Auth::Password(password) => session
                .authenticate_password(user, password.as_str())
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?,
            Auth::Key(source) => {
                let resolved = source
                    .resolve()
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;
                let key_pair = load_secret_key(resolved.path(), None)
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                session
                    .authenticate_publickey(
                        user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(format!(
                "{} authentication rejected for user {user}",
                self.conn_info.auth.kind()
            )));
        }
        Ok(())
    }

    /// Execute command on an open session
    async fn exec(session: &Session, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        // Nothing is ever written to stdin; close it so interactive
        // commands cannot hang the channel.
        channel
            .eof()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // ExitStatus may arrive before the last Data message, so drain
        // until the channel is closed.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    stdout.extend_from_slice(&data);
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status = exit_status.cast_signed();
                }
                _ => {}
            }
        }

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration: start.elapsed(),
        })
    }

    async fn exec_with_timeout(
        session: &Session,
        cmd: &str,
        limit: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        let Some(timeout_duration) = limit else {
            return Self::exec(session, cmd).await;
        };

        let start = Instant::now();
        match timeout(timeout_duration, Self::exec(session, cmd)).await {
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

    async fn open_sftp(session: &Session) -> Result<SftpSession, ExecError> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }

    async fn exists(sftp: &SftpSession, remote_path: &str) -> bool {
        sftp.metadata(remote_path).await.is_ok()
    }

    async fn upload(
        session: &Session,
        sftp: &SftpSession,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<RemoteFile, ExecError> {
        debug!(
            local_path = %local_path.display(),
            remote_path = %remote_path,
            mode = ?mode,
            mirror_local_mode,
            "uploading file"
        );

        let contents = tokio::fs::read(local_path).await?;
        let mut file = sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;
        file.write_all(&contents).await?;
        file.flush().await?;
        file.shutdown().await?;

        let attrs = sftp.metadata(remote_path).await?;
        let mut uploaded = RemoteFile {
            path: remote_path.to_string(),
            size: attrs.size,
            mode: attrs.permissions.map(|m| m & 0o7777),
        };

        let local_mode = tokio::fs::metadata(local_path).await?.permissions().mode();
        if let Some(wanted) = desired_mode(mode, mirror_local_mode, local_mode)
            && uploaded.mode != Some(wanted)
        {
            let chmod = format!("chmod {wanted:o} {}", shell::quote(remote_path));
            Self::exec(session, &chmod).await?.into_checked()?;
            uploaded.mode = Some(wanted);
        }

        Ok(uploaded)
    }

    fn upload_tree<'a>(
        session: &'a Session,
        sftp: &'a SftpSession,
        local_dir: &'a Path,
        remote_dir: String,
        mode: Option<u32>,
        mirror_local_mode: bool,
        uploaded: &'a mut Vec<RemoteFile>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>> {
        Box::pin(async move {
            if !Self::exists(sftp, &remote_dir).await {
                sftp.create_dir(remote_dir.as_str()).await?;
            }

            let mut entries = tokio::fs::read_dir(local_dir).await?;
            let mut subdirs: Vec<(PathBuf, String)> = Vec::new();

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let remote_path = format!("{remote_dir}/{}", entry.file_name().to_string_lossy());
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    subdirs.push((path, remote_path));
                } else if file_type.is_file() {
                    let file = Self::upload(
                        session,
                        sftp,
                        &path,
                        &remote_path,
                        mode,
                        mirror_local_mode,
                    )
                    .await?;
                    uploaded.push(file);
                }
            }

            for (path, remote_path) in subdirs {
                Self::upload_tree(
                    session,
                    sftp,
                    &path,
                    remote_path,
                    mode,
                    mirror_local_mode,
                    uploaded,
                )
                .await?;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Transport for SshTransport {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            auth = self.conn_info.auth.kind(),
            credential = %self.conn_info.auth.redacted(),
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());
        let connecting = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        );

        let connected = match self.conn_info.connect_timeout {
            Some(limit) => timeout(limit, connecting).await.map_err(|_| {
                ExecError::ConnectionFailed(format!("timed out after {limit:?}"))
            })?,
            None => connecting.await,
        };
        let mut session = connected.map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        self.authenticate(&mut session).await?;

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str, limit: Option<Duration>) -> Result<CommandResult, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, timeout = ?limit, "executing remote command");

        let result = Self::exec_with_timeout(session, cmd, limit).await?;

        debug!(
            command = %cmd,
            status = result.status,
            duration = ?result.duration,
            "remote command completed"
        );
        Ok(result)
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<RemoteFile, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        let sftp = Self::open_sftp(session).await?;
        let uploaded = Self::upload(
            session,
            &sftp,
            local_path,
            remote_path,
            mode,
            mirror_local_mode,
        )
        .await;
        sftp.close().await.ok();
        uploaded
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn put_dir(
        &self,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<Vec<RemoteFile>, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        debug!(local_path = %local_path.display(), remote_path = %remote_path, "uploading dir");

        let sftp = Self::open_sftp(session).await?;
        let mut uploaded = Vec::new();
        let outcome = Self::upload_tree(
            session,
            &sftp,
            local_path,
            remote_root(local_path, remote_path),
            mode,
            mirror_local_mode,
            &mut uploaded,
        )
        .await;
        sftp.close().await.ok();
        outcome.map(|()| uploaded)
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn mkdir(&self, path: &str) -> Result<(), ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        let sftp = Self::open_sftp(session).await?;
        let created = sftp.create_dir(path).await;
        sftp.close().await.ok();
        Ok(created?)
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn delete_file(&self, path: &str) -> Result<bool, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        let sftp = Self::open_sftp(session).await?;
        let removed = sftp.remove_file(path).await;
        sftp.close().await.ok();
        removed?;
        Ok(true)
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn delete_dir(
        &self,
        path: &str,
        force: bool,
        limit: Option<Duration>,
    ) -> Result<bool, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        if force {
            let command = format!("rm -rf {}", shell::quote(path));
            debug!(command = %command, "deleting dir");
            Self::exec_with_timeout(session, &command, limit)
                .await?
                .into_checked()?;
            return Ok(true);
        }

        let sftp = Self::open_sftp(session).await?;
        let removed = sftp.remove_dir(path).await;
        sftp.close().await.ok();
        removed?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::Io(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "ssh"
    }
}

/// Builder for `SshTransport`
pub struct SshTransportBuilder {
    conn_info: ConnectionInfo,
}

impl SshTransportBuilder {
    /// Create builder with required fields; authenticates with `auth`
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: Auth) -> Self {
        Self {
            conn_info: ConnectionInfo::new(host, user, auth),
        }
    }

    /// Authenticate with a password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.conn_info.auth = Auth::Password(password.into());
        self
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.conn_info.auth = Auth::Key(KeySource::Path(path.into()));
        self
    }

    /// Set key from environment variable (base64)
    #[must_use]
    pub fn with_env_key(mut self, var_name: impl Into<String>) -> Self {
        self.conn_info.auth = Auth::Key(KeySource::Env(var_name.into()));
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.conn_info.port = port;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, limit: Option<Duration>) -> Self {
        self.conn_info.connect_timeout = limit;
        self
    }

    /// Build the transport
    #[must_use]
    pub fn build(self) -> SshTransport {
        SshTransport::new(self.conn_info)
    }
}
