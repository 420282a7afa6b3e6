//! Opportunistic structured reinterpretation of command output

use serde::Serialize;
use serde_json::Value;

use crate::record::{CommandRecord, FleetResults};

/// Fields of a command record that get reinterpreted
pub const TRANSFORMED_KEYS: [&str; 2] = ["stdout", "stderr"];

/// Command output: raw text, or the JSON value it parsed as
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputField {
    Structured(Value),
    Text(String),
}

impl OutputField {
    /// Raw text, if not reinterpreted
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputField::Text(text) => Some(text),
            OutputField::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            OutputField::Structured(value) => Some(value),
            OutputField::Text(_) => None,
        }
    }
}

/// Parse `field` as JSON when it is text that holds a JSON value
#[must_use]
pub fn reinterpret(field: OutputField) -> OutputField {
    match field {
        OutputField::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => OutputField::Structured(value),
            Err(_) => OutputField::Text(text),
        },
        structured @ OutputField::Structured(_) => structured,
    }
}

/// Reinterpret the `TRANSFORMED_KEYS` fields of every success record
///
/// Error records carry no output and pass through unchanged.
#[must_use]
pub fn transform_results(results: FleetResults<CommandRecord>) -> FleetResults<CommandRecord> {
    results.map(|mut record| {
        for key in TRANSFORMED_KEYS {
            if let Some(field) = record.output_mut(key) {
                let raw = std::mem::replace(field, OutputField::Text(String::new()));
                *field = reinterpret(raw);
            }
        }
        record
    })
}
