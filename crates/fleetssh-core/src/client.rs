//! `ParallelClient`: fan one operation out to every host of a fleet
//!
//! Every operation returns a `FleetResults` holding exactly one entry per
//! configured hostname. Per-host failures become `ErrorRecord`s; only
//! configuration errors, and connect failures the caller asked to
//! propagate, surface as `Err`.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use fleetssh_exec::{ExecError, Transport};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::factory::TransportFactory;
use crate::host::HostAddr;
use crate::pool::WorkerPool;
use crate::postprocess::transform_results;
use crate::record::{
    CommandRecord, ConnectRecord, ErrorRecord, FleetResults, HostOutcome, Upload,
};
use crate::registry::{HostSummary, Registry, Session};

/// Prefix of every connect failure message
pub const CONNECT_ERROR: &str = "Cannot connect to host.";

/// Message of a host that has neither a session nor a cached failure
pub const NOT_CONNECTED: &str = "Not connected to host.";

/// Outcome of one connect work item
enum ConnectAttempt {
    Connected(Arc<dyn Transport>),
    Failed(ExecError),
    /// Not attempted because an earlier host failed in raising mode
    Skipped,
}

/// Parallel SSH client over a fixed set of hosts
pub struct ParallelClient {
    config: ClientConfig,
    addrs: Vec<HostAddr>,
    registry: Registry,
    pool: WorkerPool,
    factory: Arc<dyn TransportFactory>,
}

impl std::fmt::Debug for ParallelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelClient")
            .field("config", &self.config)
            .field("addrs", &self.addrs)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ParallelClient {
    /// Validate `config` and, unless disabled, connect to every host
    ///
    /// # Errors
    /// Returns `CoreError::NoHosts`, `InvalidHost`, `DuplicateHost` or
    /// `ConfigError` for a bad configuration, and `CoreError::Connect` when
    /// connecting on construction with `raise_on_connect_error` fails.
    pub async fn new(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self, CoreError> {
        if config.hosts.is_empty() {
            return Err(CoreError::NoHosts);
        }

        let mut seen = HashSet::new();
        let mut addrs = Vec::with_capacity(config.hosts.len());
        for spec in &config.hosts {
            let addr = HostAddr::parse(spec, config.port)?;
            if !seen.insert(addr.hostname.clone()) {
                return Err(CoreError::DuplicateHost(addr.hostname));
            }
            addrs.push(addr);
        }

        let pool = WorkerPool::new(config.concurrency)?;

        info!(
            hosts = addrs.len(),
            user = %config.user,
            concurrency = config.concurrency,
            "creating parallel client"
        );

        let connect_now = config.connect_on_construct;
        let raise = config.raise_on_connect_error;

        let mut client = Self {
            config,
            addrs,
            registry: Registry::new(),
            pool,
            factory,
        };

        if connect_now {
            let results = client.connect(raise).await?;
            debug!(
                connected = results.len() - results.error_hosts().count(),
                failed = results.error_hosts().count(),
                "initial connect finished"
            );
        }

        Ok(client)
    }

    /// Configured hosts, in configuration order
    #[must_use]
    pub fn hosts(&self) -> &[HostAddr] {
        &self.addrs
    }

    /// Cached connect failures
    pub fn bad_hosts(&self) -> impl Iterator<Item = (&str, &ErrorRecord)> {
        self.registry
            .bad_hosts()
            .iter()
            .map(|(host, record)| (host.as_str(), record))
    }

    pub fn live_hosts(&self) -> impl Iterator<Item = &str> {
        self.registry.live_hosts()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<HostSummary> {
        self.registry.summaries(&self.addrs)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to every host
    ///
    /// Live sessions are reused. Hosts that fail are cached as bad and
    /// skipped by every other operation until `connect` succeeds for them.
    /// With `raise_on_error` the first failure stops further attempts and is
    /// returned instead of being cached; hosts that connected meanwhile stay
    /// registered.
    ///
    /// # Errors
    /// Returns `CoreError::ConfigError` once the client is closed, and
    /// `CoreError::Connect` for a failure when `raise_on_error` is set
    pub async fn connect(
        &mut self,
        raise_on_error: bool,
    ) -> Result<FleetResults<ConnectRecord>, CoreError> {
        if self.pool.is_closed() {
            return Err(CoreError::ConfigError(
                "cannot connect with a closed client".to_string(),
            ));
        }

        let abort = Arc::new(AtomicBool::new(false));
        let credential = self
            .config
            .auth()
            .map_or_else(|_| "none".to_string(), |auth| auth.redacted());
        let mut batch = self.pool.batch::<ConnectAttempt>();

        for addr in &self.addrs {
            if raise_on_error && abort.load(Ordering::SeqCst) {
                break;
            }

            let host = addr.hostname.clone();
            let existing = self.registry.transport(&host);
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let addr = addr.clone();
            let abort = Arc::clone(&abort);

            info!(
                host = %host,
                port = addr.port,
                user = %config.user,
                credential = %credential,
                "connecting to host"
            );

            batch
                .submit(host, async move {
                    if raise_on_error && abort.load(Ordering::SeqCst) {
                        return HostOutcome::Ok(ConnectAttempt::Skipped);
                    }

                    let attempt = match existing {
                        Some(transport) => Ok(transport),
                        None => open_transport(factory.as_ref(), &addr, &config).await,
                    };

                    match attempt {
                        Ok(transport) => HostOutcome::Ok(ConnectAttempt::Connected(transport)),
                        Err(e) => {
                            abort.store(true, Ordering::SeqCst);
                            HostOutcome::Ok(ConnectAttempt::Failed(e))
                        }
                    }
                })
                .await;
        }

        let attempts = batch.join().await;

        let mut results = FleetResults::new();
        let mut first_failure = None;

        for (host, attempt) in attempts {
            match attempt {
                HostOutcome::Ok(ConnectAttempt::Connected(transport)) => {
                    if let Some(addr) = self.addrs.iter().find(|a| a.hostname == host) {
                        let reused = self
                            .registry
                            .transport(&host)
                            .is_some_and(|t| Arc::ptr_eq(&t, &transport));
                        if !reused {
                            self.registry
                                .insert_session(Session::new(addr.clone(), transport));
                        }
                    }
                    results.insert(host, HostOutcome::Ok(ConnectRecord::default()));
                }
                HostOutcome::Ok(ConnectAttempt::Failed(e)) => {
                    error!(host = %host, error = %e, "failed connecting to host");
                    if raise_on_error && first_failure.is_none() {
                        first_failure = Some((host, e));
                        continue;
                    }
                    let record = ErrorRecord::from_error(format!("{CONNECT_ERROR} {e}"), &e);
                    if let Some(stale) = self.registry.mark_bad(&host, record.clone()) {
                        close_session(&host, &stale).await;
                    }
                    results.insert(host, HostOutcome::Err(record));
                }
                HostOutcome::Ok(ConnectAttempt::Skipped) => {
                    debug!(host = %host, "connect skipped after earlier failure");
                }
                HostOutcome::Err(record) => {
                    error!(host = %host, error = %record.error, "connect worker aborted");
                    if let Some(stale) = self.registry.mark_bad(&host, record.clone()) {
                        close_session(&host, &stale).await;
                    }
                    results.insert(host, HostOutcome::Err(record));
                }
            }
        }

        if let Some((host, source)) = first_failure {
            return Err(CoreError::Connect { host, source });
        }

        Ok(results)
    }

    /// Run `cmd` on every live host
    ///
    /// A non-empty `cwd` rewrites the command to `cd <cwd> && <cmd>`.
    /// Output that parses as JSON is returned structured.
    pub async fn run(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
        cwd: Option<&str>,
    ) -> FleetResults<CommandRecord> {
        let command = match cwd {
            Some(dir) if !dir.is_empty() => format!("cd {dir} && {cmd}"),
            _ => cmd.to_string(),
        };

        info!(command = %command, hosts = self.addrs.len(), "running command");

        let shown = command.clone();
        let results = self
            .execute_in_pool(
                move |transport| {
                    let command = command.clone();
                    async move {
                        transport
                            .run(&command, timeout)
                            .await
                            .map(CommandRecord::from)
                    }
                },
                move |host| format!("Failed executing command {shown} on host {host}"),
            )
            .await;

        transform_results(results)
    }

    /// Upload a file or directory tree to every live host
    ///
    /// # Errors
    /// Returns `CoreError::LocalPathNotFound` before contacting any host when
    /// `local_path` does not exist
    pub async fn put(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        mode: Option<u32>,
        mirror_local_mode: bool,
    ) -> Result<FleetResults<Upload>, CoreError> {
        let local: PathBuf = local_path.as_ref().to_path_buf();
        if !local.exists() {
            return Err(CoreError::LocalPathNotFound(local));
        }

        let is_dir = local.is_dir();
        let remote = remote_path.to_string();
        let shown = local.display().to_string();

        info!(
            local = %shown,
            remote = %remote,
            dir = is_dir,
            "sending file(s)"
        );

        let results = self
            .execute_in_pool(
                move |transport| {
                    let local = local.clone();
                    let remote = remote.clone();
                    async move {
                        if is_dir {
                            transport
                                .put_dir(&local, &remote, mode, mirror_local_mode)
                                .await
                                .map(Upload::Dir)
                        } else {
                            transport
                                .put(&local, &remote, mode, mirror_local_mode)
                                .await
                                .map(Upload::File)
                        }
                    }
                },
                move |host| format!("Failed sending file(s) in path {shown} to host {host}"),
            )
            .await;

        Ok(results)
    }

    /// Create `path` on every live host
    pub async fn mkdir(&self, path: &str) -> FleetResults<()> {
        let target = path.to_string();
        let shown = target.clone();
        self.execute_in_pool(
            move |transport| {
                let target = target.clone();
                async move { transport.mkdir(&target).await }
            },
            move |host| format!("Failed \"mkdir {shown}\" on host {host}."),
        )
        .await
    }

    /// Delete the file `path` on every live host
    pub async fn delete_file(&self, path: &str) -> FleetResults<bool> {
        let target = path.to_string();
        let shown = target.clone();
        self.execute_in_pool(
            move |transport| {
                let target = target.clone();
                async move { transport.delete_file(&target).await }
            },
            move |host| format!("Failed deleting file {shown} on host {host}."),
        )
        .await
    }

    /// Delete the directory `path` on every live host
    ///
    /// `force` removes it recursively, bounded by `timeout`.
    pub async fn delete_dir(
        &self,
        path: &str,
        force: bool,
        timeout: Option<Duration>,
    ) -> FleetResults<bool> {
        let target = path.to_string();
        let shown = target.clone();
        self.execute_in_pool(
            move |transport| {
                let target = target.clone();
                async move { transport.delete_dir(&target, force, timeout).await }
            },
            move |host| format!("Failed deleting dir {shown} on host {host}."),
        )
        .await
    }

    /// Close every live session and stop the worker pool
    ///
    /// A session that fails to close is logged and the rest still get closed.
    pub async fn close(&mut self) {
        for session in self.registry.drain_sessions() {
            close_session(&session.addr.hostname, &session).await;
        }
        self.pool.close();
        info!("parallel client closed");
    }

    /// Shared fan-out shape of every operation but `connect`
    ///
    /// Bad hosts get their cached record, hosts never connected get a
    /// not-connected record, every live host runs `action` once.
    async fn execute_in_pool<T, A, Fut, D>(&self, action: A, describe_failure: D) -> FleetResults<T>
    where
        T: Send + 'static,
        A: Fn(Arc<dyn Transport>) -> Fut,
        Fut: Future<Output = Result<T, ExecError>> + Send + 'static,
        D: Fn(&str) -> String,
    {
        let mut batch = self.pool.batch::<T>();

        for addr in &self.addrs {
            let host = addr.hostname.clone();

            if let Some(record) = self.registry.bad_hosts().get(&host) {
                batch.seed(host, HostOutcome::Err(record.clone()));
                continue;
            }

            let Some(transport) = self.registry.transport(&host) else {
                batch.seed(host, HostOutcome::Err(ErrorRecord::new(NOT_CONNECTED)));
                continue;
            };

            let message = describe_failure(&host);
            let work = action(transport);
            let label = host.clone();

            batch
                .submit(host, async move {
                    match work.await {
                        Ok(value) => HostOutcome::Ok(value),
                        Err(e) => {
                            error!(host = %label, error = %e, "{message}");
                            HostOutcome::Err(ErrorRecord::from_error(message, &e))
                        }
                    }
                })
                .await;
        }

        batch.join().await
    }
}

async fn open_transport(
    factory: &dyn TransportFactory,
    addr: &HostAddr,
    config: &ClientConfig,
) -> Result<Arc<dyn Transport>, ExecError> {
    let transport = factory.create_transport(addr, config).await?;
    transport.connect().await?;
    Ok(transport)
}

async fn close_session(host: &str, session: &Session) {
    match session.transport.close().await {
        Ok(()) => debug!(host = %host, "session closed"),
        Err(e) => warn!(host = %host, error = %e, "failed closing session"),
    }
}
