//! Connection registry: live sessions and memoized bad hosts

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fleetssh_exec::Transport;

use crate::host::HostAddr;
use crate::record::ErrorRecord;

/// A live transport registered under its hostname
#[derive(Clone)]
pub struct Session {
    pub addr: HostAddr,
    pub transport: Arc<dyn Transport>,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(addr: HostAddr, transport: Arc<dyn Transport>) -> Self {
        Self {
            addr,
            transport,
            connected_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.addr)
            .field("transport", &self.transport.transport_type())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Connection state of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    /// Never connected
    Pending,
    Connected,
    /// Connect failed; skipped by every operation but `connect`
    Bad,
}

/// Per-host registry view
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    pub hostname: String,
    pub port: u16,
    pub state: HostState,
    pub transport: Option<&'static str>,
    pub connected_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Hostname -> session and hostname -> cached connect failure
///
/// A hostname is never in both maps.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: BTreeMap<String, Session>,
    bad_hosts: BTreeMap<String, ErrorRecord>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live session, clearing any cached failure
    pub fn insert_session(&mut self, session: Session) {
        let host = session.addr.hostname.clone();
        self.bad_hosts.remove(&host);
        self.sessions.insert(host, session);
    }

    /// Cache a connect failure
    ///
    /// Returns the session the host had, which the caller must close.
    pub fn mark_bad(&mut self, host: &str, record: ErrorRecord) -> Option<Session> {
        self.bad_hosts.insert(host.to_string(), record);
        self.sessions.remove(host)
    }

    pub fn session(&self, host: &str) -> Option<&Session> {
        self.sessions.get(host)
    }

    pub fn transport(&self, host: &str) -> Option<Arc<dyn Transport>> {
        self.sessions.get(host).map(|s| Arc::clone(&s.transport))
    }

    #[must_use]
    pub fn bad_hosts(&self) -> &BTreeMap<String, ErrorRecord> {
        &self.bad_hosts
    }

    #[must_use]
    pub fn is_bad(&self, host: &str) -> bool {
        self.bad_hosts.contains_key(host)
    }

    pub fn live_hosts(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Live sessions, sorted by hostname
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Remove and return every live session
    pub fn drain_sessions(&mut self) -> Vec<Session> {
        std::mem::take(&mut self.sessions).into_values().collect()
    }

    /// Summaries of `addrs` in the given order
    #[must_use]
    pub fn summaries(&self, addrs: &[HostAddr]) -> Vec<HostSummary> {
        addrs
            .iter()
            .map(|addr| {
                let host = &addr.hostname;
                if let Some(session) = self.sessions.get(host) {
                    HostSummary {
                        hostname: host.clone(),
                        port: addr.port,
                        state: HostState::Connected,
                        transport: Some(session.transport.transport_type()),
                        connected_at: Some(session.connected_at),
                        error: None,
                    }
                } else {
                    HostSummary {
                        hostname: host.clone(),
                        port: addr.port,
                        state: if self.is_bad(host) {
                            HostState::Bad
                        } else {
                            HostState::Pending
                        },
                        transport: None,
                        connected_at: None,
                        error: self.bad_hosts.get(host).map(|r| r.error.clone()),
                    }
                }
            })
            .collect()
    }
}
