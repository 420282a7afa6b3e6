//! Per-host result records
//!
//! Every fan-out operation returns a `FleetResults<T>`: one entry per
//! hostname, holding either the operation's success record `T` or the
//! uniform `ErrorRecord`.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::error::Error as StdError;

use serde::Serialize;

use fleetssh_exec::{CommandResult, RemoteFile};

use crate::postprocess::OutputField;

/// Return code carried by every error record
pub const ERROR_RETURN_CODE: i32 = 255;

/// Maximum number of error-chain entries rendered into a traceback
pub const TRACEBACK_LIMIT: usize = 20;

/// Message of a successful connect
pub const CONNECTED_MESSAGE: &str = "Connected to host.";

/// Canonical failure record, identical for every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub error: String,
    pub traceback: String,
    pub failed: bool,
    pub succeeded: bool,
    pub return_code: i32,
}

impl ErrorRecord {
    /// Record without a traceback
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            traceback: String::new(),
            failed: true,
            succeeded: false,
            return_code: ERROR_RETURN_CODE,
        }
    }

    /// Record whose traceback renders `err` and its sources
    pub fn from_error(error: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        Self {
            traceback: render_traceback(err),
            ..Self::new(error)
        }
    }
}

/// Render the `source()` chain of `err`, outermost first
#[must_use]
pub fn render_traceback(err: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(err), |&e: &&(dyn StdError + 'static)| e.source())
        .take(TRACEBACK_LIMIT)
        .enumerate()
        .map(|(depth, e)| format!("{depth}: {e}\n"))
        .collect()
}

/// Whether a record counts as a success for status aggregation
pub trait Success {
    fn succeeded(&self) -> bool;
}

/// One host's entry in a result map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostOutcome<T> {
    Ok(T),
    Err(ErrorRecord),
}

impl<T> HostOutcome<T> {
    #[must_use]
    pub fn is_err(&self) -> bool {
        matches!(self, HostOutcome::Err(_))
    }

    /// Success record, if any
    pub fn ok(&self) -> Option<&T> {
        match self {
            HostOutcome::Ok(value) => Some(value),
            HostOutcome::Err(_) => None,
        }
    }

    /// Error record, if any
    pub fn err(&self) -> Option<&ErrorRecord> {
        match self {
            HostOutcome::Ok(_) => None,
            HostOutcome::Err(record) => Some(record),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> HostOutcome<U> {
        match self {
            HostOutcome::Ok(value) => HostOutcome::Ok(f(value)),
            HostOutcome::Err(record) => HostOutcome::Err(record),
        }
    }
}

impl<T: Success> Success for HostOutcome<T> {
    fn succeeded(&self) -> bool {
        match self {
            HostOutcome::Ok(value) => value.succeeded(),
            HostOutcome::Err(_) => false,
        }
    }
}

/// Hostname -> outcome map returned by every operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FleetResults<T>(BTreeMap<String, HostOutcome<T>>);

impl<T> FleetResults<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub(crate) fn insert(&mut self, host: String, outcome: HostOutcome<T>) {
        self.0.insert(host, outcome);
    }

    pub fn get(&self, host: &str) -> Option<&HostOutcome<T>> {
        self.0.get(host)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.0.contains_key(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, HostOutcome<T>> {
        self.0.iter()
    }

    /// Hosts whose entry is an error record
    pub fn error_hosts(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(host, _)| host.as_str())
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> FleetResults<U> {
        FleetResults(
            self.0
                .into_iter()
                .map(|(host, outcome)| (host, outcome.map(&mut f)))
                .collect(),
        )
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, HostOutcome<T>> {
        self.0
    }
}

impl<T: Success> FleetResults<T> {
    /// Hosts that did not succeed, error records included
    pub fn failed_hosts(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, outcome)| !outcome.succeeded())
            .map(|(host, _)| host.as_str())
    }

    pub fn succeeded_hosts(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, outcome)| outcome.succeeded())
            .map(|(host, _)| host.as_str())
    }
}

impl<T> Default for FleetResults<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<BTreeMap<String, HostOutcome<T>>> for FleetResults<T> {
    fn from(map: BTreeMap<String, HostOutcome<T>>) -> Self {
        Self(map)
    }
}

impl<T> IntoIterator for FleetResults<T> {
    type Item = (String, HostOutcome<T>);
    type IntoIter = btree_map::IntoIter<String, HostOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a FleetResults<T> {
    type Item = (&'a String, &'a HostOutcome<T>);
    type IntoIter = btree_map::Iter<'a, String, HostOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Success record of `connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectRecord {
    pub message: String,
}

impl Default for ConnectRecord {
    fn default() -> Self {
        Self {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }
}

impl Success for ConnectRecord {
    fn succeeded(&self) -> bool {
        true
    }
}

/// Success record of `run`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub stdout: OutputField,
    pub stderr: OutputField,
    pub return_code: i32,
    pub succeeded: bool,
    pub failed: bool,
}

impl From<CommandResult> for CommandRecord {
    fn from(result: CommandResult) -> Self {
        let succeeded = result.success();
        Self {
            stdout: OutputField::Text(result.stdout),
            stderr: OutputField::Text(result.stderr),
            return_code: result.status,
            succeeded,
            failed: !succeeded,
        }
    }
}

impl CommandRecord {
    /// Output field serialized under `key`
    pub fn output_mut(&mut self, key: &str) -> Option<&mut OutputField> {
        match key {
            "stdout" => Some(&mut self.stdout),
            "stderr" => Some(&mut self.stderr),
            _ => None,
        }
    }
}

impl Success for CommandRecord {
    fn succeeded(&self) -> bool {
        self.succeeded
    }
}

/// Success record of `put`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Upload {
    File(RemoteFile),
    Dir(Vec<RemoteFile>),
}

impl Success for Upload {
    fn succeeded(&self) -> bool {
        true
    }
}

impl Success for () {
    fn succeeded(&self) -> bool {
        true
    }
}

impl Success for bool {
    fn succeeded(&self) -> bool {
        *self
    }
}
