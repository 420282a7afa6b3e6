#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleetssh_core::{ClientConfig, HostAddr, TransportFactory};
use fleetssh_exec::{CommandResult, ExecError, RemoteFile, Transport};

/// Shared behaviour and bookkeeping of a simulated fleet
#[derive(Default)]
pub struct MockFleet {
    unreachable: Mutex<HashSet<String>>,
    broken: HashSet<String>,
    delay: Duration,
    connects: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<(String, String)>>,
    closed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts whose connect fails
    pub fn unreachable(self, hosts: &[&str]) -> Self {
        *self.unreachable.lock().unwrap() = hosts.iter().map(|h| (*h).to_string()).collect();
        self
    }

    /// Hosts that connect but fail every operation
    pub fn broken(mut self, hosts: &[&str]) -> Self {
        self.broken = hosts.iter().map(|h| (*h).to_string()).collect();
        self
    }

    /// Time every operation blocks for
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn make_reachable(&self, host: &str) {
        self.unreachable.lock().unwrap().remove(host);
    }

    pub fn connects(&self, host: &str) -> usize {
        self.connects.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.connects.lock().unwrap().values().sum()
    }

    /// `(host, operation)` pairs in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, op)| op)
            .collect()
    }

    pub fn closed(&self) -> Vec<String> {
        let mut closed = self.closed.lock().unwrap().clone();
        closed.sort();
        closed
    }

    /// Most operations observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    host: String,
    fleet: Arc<MockFleet>,
}

impl MockTransport {
    async fn operation(&self, op: String) -> Result<(), ExecError> {
        self.fleet
            .calls
            .lock()
            .unwrap()
            .push((self.host.clone(), op));

        let now = self.fleet.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.fleet.peak.fetch_max(now, Ordering::SeqCst);
        if !self.fleet.delay.is_zero() {
            tokio::time::sleep(self.fleet.delay).await;
        }
        self.fleet.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fleet.broken.contains(&self.host) {
            return Err(ExecError::Io("channel closed by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), ExecError> {
        *self
            .fleet
            .connects
            .lock()
            .unwrap()
            .entry(self.host.clone())
            .or_default() += 1;

        if self.fleet.unreachable.lock().unwrap().contains(&self.host) {
            return Err(ExecError::ConnectionFailed("connection refused".to_string()));
        }
        Ok(())
    }

    async fn run(&self, cmd: &str, _timeout: Option<Duration>) -> Result<CommandResult, ExecError> {
        self.operation(format!("run {cmd}")).await?;

        let status = cmd
            .rsplit_once("exit ")
            .and_then(|(_, code)| code.trim().parse().ok())
            .unwrap_or(0);
        let stdout = if cmd.ends_with("facts") {
            format!("{{\"host\": \"{}\", \"cpus\": 4}}", self.host)
        } else {
            format!("{}\n", self.host)
        };

        Ok(CommandResult {
            status,
            stdout,
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn put(
        &self,
        _local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        _mirror_local_mode: bool,
    ) -> Result<RemoteFile, ExecError> {
        self.operation(format!("put {remote_path}")).await?;
        Ok(RemoteFile {
            path: remote_path.to_string(),
            size: Some(3),
            mode,
        })
    }

    async fn put_dir(
        &self,
        _local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        _mirror_local_mode: bool,
    ) -> Result<Vec<RemoteFile>, ExecError> {
        self.operation(format!("put_dir {remote_path}")).await?;
        Ok(vec![RemoteFile {
            path: format!("{remote_path}/a.txt"),
            size: Some(1),
            mode,
        }])
    }

    async fn mkdir(&self, path: &str) -> Result<(), ExecError> {
        self.operation(format!("mkdir {path}")).await
    }

    async fn delete_file(&self, path: &str) -> Result<bool, ExecError> {
        self.operation(format!("delete_file {path}")).await?;
        Ok(true)
    }

    async fn delete_dir(
        &self,
        path: &str,
        force: bool,
        _timeout: Option<Duration>,
    ) -> Result<bool, ExecError> {
        self.operation(format!("delete_dir {path} force={force}"))
            .await?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.fleet.closed.lock().unwrap().push(self.host.clone());
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "mock"
    }
}

pub struct MockFactory(pub Arc<MockFleet>);

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create_transport(
        &self,
        addr: &HostAddr,
        _config: &ClientConfig,
    ) -> Result<Arc<dyn Transport>, ExecError> {
        Ok(Arc::new(MockTransport {
            host: addr.hostname.clone(),
            fleet: Arc::clone(&self.0),
        }))
    }
}

pub fn config(hosts: &[&str]) -> ClientConfig {
    ClientConfig::new(hosts.iter().copied()).with_password("hunter2")
}
