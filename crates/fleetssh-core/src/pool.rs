//! Bounded worker pool
//!
//! One `WorkerPool` is shared by every fan-out of a client. Each fan-out
//! opens a `Batch`, submits one work item per host and joins the batch.
//! Submitting waits for a free permit, so no more than `concurrency` items
//! are ever spawned at once.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::CoreError;
use crate::record::{ErrorRecord, FleetResults, HostOutcome};

/// Semaphore-bounded pool of concurrent host work items
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool running at most `concurrency` items at once
    ///
    /// # Errors
    /// Returns `CoreError::ConfigError` when `concurrency` is zero
    pub fn new(concurrency: usize) -> Result<Self, CoreError> {
        if concurrency == 0 {
            return Err(CoreError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Configured bound
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Permits not currently held by a running item
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Open a batch of work items sharing this pool's bound
    #[must_use]
    pub fn batch<T>(&self) -> Batch<T> {
        Batch {
            permits: Arc::clone(&self.permits),
            pending: Vec::new(),
            seeded: BTreeMap::new(),
        }
    }

    /// Stop admitting work; running items finish normally
    pub fn close(&self) {
        self.permits.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Work items of one fan-out, joined together
#[must_use = "a batch does nothing until joined"]
pub struct Batch<T> {
    permits: Arc<Semaphore>,
    pending: Vec<(String, JoinHandle<HostOutcome<T>>)>,
    seeded: BTreeMap<String, HostOutcome<T>>,
}

impl<T: Send + 'static> Batch<T> {
    /// Record an outcome for `host` without running anything
    pub fn seed(&mut self, host: impl Into<String>, outcome: HostOutcome<T>) {
        self.seeded.insert(host.into(), outcome);
    }

    /// Number of items submitted so far
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.pending.len()
    }

    /// Spawn `work` for `host` once a permit is free
    ///
    /// Waits while the pool is saturated. On a closed pool the host gets an
    /// error record instead.
    pub async fn submit<F>(&mut self, host: impl Into<String>, work: F)
    where
        F: Future<Output = HostOutcome<T>> + Send + 'static,
    {
        let host = host.into();

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                debug!(host = %host, "worker pool closed, not submitting");
                self.seeded.insert(
                    host.clone(),
                    HostOutcome::Err(ErrorRecord::from_error(
                        format!("Worker pool closed before running work for host {host}"),
                        &e,
                    )),
                );
                return;
            }
        };

        let handle = tokio::spawn(async move {
            let outcome = work.await;
            drop(permit);
            outcome
        });
        self.pending.push((host, handle));
    }

    /// Wait for every submitted item and merge the outcomes
    ///
    /// A work item that panicked or was cancelled yields an error record for
    /// its own host; siblings are unaffected.
    pub async fn join(self) -> FleetResults<T> {
        let mut results = self.seeded;

        for (host, handle) in self.pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(host = %host, error = %e, "work item aborted");
                    HostOutcome::Err(ErrorRecord::from_error(
                        format!("Work item for host {host} aborted: {e}"),
                        &e,
                    ))
                }
            };
            results.insert(host, outcome);
        }

        FleetResults::from(results)
    }
}
