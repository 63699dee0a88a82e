//! Per-pass record of which context keys were evaluated and which failed.

use crate::core::{keys, ContextMap};
use crate::errors::MalformedSummaryError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Severity of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureLevel {
    /// The expression could not be resolved.
    #[default]
    Error,
    /// The expression resolved with a caveat.
    Warn,
    /// Informational.
    Info,
}

/// One failed evaluation of a context key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    /// Human-readable description shown to users.
    pub description: String,
    /// Short name of the underlying failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    /// Severity.
    #[serde(default)]
    pub level: FailureLevel,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Set once the description has been copied into the exception payload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub included: bool,
}

impl FailureEntry {
    /// Creates an error-level entry stamped with the current time.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            exception_type: None,
            level: FailureLevel::Error,
            timestamp: Utc::now().timestamp_millis(),
            included: false,
        }
    }

    /// Sets the exception type.
    #[must_use]
    pub fn with_exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    /// Sets the level.
    #[must_use]
    pub fn with_level(mut self, level: FailureLevel) -> Self {
        self.level = level;
        self
    }
}

/// Transient result of one evaluation pass.
///
/// Never persisted directly: its failures are folded into the stage's
/// `summary` key by [`EvaluationSummary::merge_into`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationSummary {
    attempted: HashSet<String>,
    failures: BTreeMap<String, Vec<FailureEntry>>,
}

impl EvaluationSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as attempted in this pass.
    pub fn record_attempt(&mut self, key: impl Into<String>) {
        self.attempted.insert(key.into());
    }

    /// Records a failure for `key`, which also counts as an attempt.
    pub fn add_failure(&mut self, key: impl Into<String>, entry: FailureEntry) {
        let key = key.into();
        self.attempted.insert(key.clone());
        self.failures.entry(key).or_default().push(entry);
    }

    /// Returns true if `key` was evaluated in this pass.
    #[must_use]
    pub fn was_attempted(&self, key: &str) -> bool {
        self.attempted.contains(key)
    }

    /// Returns true if `key` failed in this pass.
    #[must_use]
    pub fn has_failed(&self, key: &str) -> bool {
        self.failures.contains_key(key)
    }

    /// Returns true if `key` was evaluated and did not fail.
    #[must_use]
    pub fn succeeded(&self, key: &str) -> bool {
        self.was_attempted(key) && !self.has_failed(key)
    }

    /// Returns the failures recorded for `key`.
    #[must_use]
    pub fn failures_for(&self, key: &str) -> &[FailureEntry] {
        self.failures.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates over failed keys and their entries, ordered by key.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &[FailureEntry])> {
        self.failures.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of keys attempted.
    #[must_use]
    pub fn total_evaluated(&self) -> usize {
        self.attempted.len()
    }

    /// Number of failure entries across all keys.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }

    /// Returns true if nothing was attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempted.is_empty()
    }

    /// Folds this pass's failures into the persisted `summary` key of `context`.
    ///
    /// Each failed key's record list is replaced with the entries from this
    /// pass; records for other keys are left alone. An entry whose
    /// description was already included in the exception payload for the
    /// same key keeps its `included` mark. Nothing is written when the pass
    /// had no failures.
    pub fn merge_into(&self, context: &mut ContextMap) -> Result<(), MalformedSummaryError> {
        if self.failures.is_empty() {
            return Ok(());
        }

        let records = context
            .entry(keys::SUMMARY.to_string())
            .or_insert_with(|| Value::Object(ContextMap::new()));
        let Value::Object(records) = records else {
            return Err(MalformedSummaryError::new("expected an object of failure lists"));
        };

        for (key, entries) in &self.failures {
            let reported = included_descriptions(records.get(key));
            let list = entries
                .iter()
                .map(|entry| {
                    let mut entry = entry.clone();
                    entry.included |= reported.contains(entry.description.as_str());
                    serde_json::to_value(entry)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MalformedSummaryError::for_key(key, e.to_string()))?;
            records.insert(key.clone(), Value::Array(list));
        }

        Ok(())
    }
}

/// Descriptions of a persisted record list that already reached the
/// exception payload.
fn included_descriptions(records: Option<&Value>) -> HashSet<&str> {
    let Some(Value::Array(entries)) = records else {
        return HashSet::new();
    };
    entries
        .iter()
        .filter(|entry| entry.get("included") == Some(&Value::Bool(true)))
        .filter_map(|entry| entry.get("description").and_then(Value::as_str))
        .collect()
}
