//! Aggregate status of a result map, and concurrency derivation

use serde::Serialize;

use crate::record::{FleetResults, Success};

/// Overall outcome of one fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Succeeded,
    Failed,
}

impl ResultStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == ResultStatus::Succeeded
    }
}

/// Collapse a result map into one status
///
/// Without `allow_partial_failure` every host must have succeeded; with it a
/// single succeeded host is enough. An empty map has nothing that failed
/// and nothing that succeeded.
#[must_use]
pub fn result_status<T: Success>(
    results: &FleetResults<T>,
    allow_partial_failure: bool,
) -> ResultStatus {
    let ok = if allow_partial_failure {
        results.iter().any(|(_, outcome)| outcome.succeeded())
    } else {
        results.iter().all(|(_, outcome)| outcome.succeeded())
    };

    if ok {
        ResultStatus::Succeeded
    } else {
        ResultStatus::Failed
    }
}

/// Concurrency for a fleet of `host_count` hosts
///
/// A third of the fleet plus one when running in parallel, one otherwise,
/// never more than `max_parallel` and never less than one.
#[must_use]
pub fn derive_concurrency(host_count: usize, parallel: bool, max_parallel: usize) -> usize {
    let wanted = if parallel { host_count / 3 + 1 } else { 1 };
    wanted.min(max_parallel).max(1)
}
