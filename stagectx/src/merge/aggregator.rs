//! Folding of failure records into the stage's exception payload.

use super::{BestEffort, ExceptionFormatter, FailurePolicy};
use crate::core::{keys, ContextMap, StageExecution};
use crate::errors::{ContextError, MalformedSummaryError};
use serde_json::Value;
use tracing::{debug, error};

const INCLUDED: &str = "included";

/// Merges failure descriptions into `exception.details.errors`.
pub struct ExceptionAggregator<'a> {
    formatter: &'a dyn ExceptionFormatter,
    kind: &'a str,
}

impl<'a> ExceptionAggregator<'a> {
    /// Creates an aggregator that formats new payloads with `formatter`,
    /// reporting them under `kind`.
    #[must_use]
    pub fn new(formatter: &'a dyn ExceptionFormatter, kind: &'a str) -> Self {
        Self { formatter, kind }
    }

    /// Appends the description of every failure entry not yet reported to
    /// the stage's exception payload.
    ///
    /// Existing errors are kept in order and every pending description is
    /// appended, duplicates included. Reported entries are marked
    /// `included` in the failure records so a repeated call is a no-op.
    /// Malformed records or payloads are logged and the context is left
    /// unmodified.
    pub fn include_evaluation_summary(&self, stage: &StageExecution) -> BestEffort {
        if !FailurePolicy::has_failures(stage) {
            return BestEffort::Skipped;
        }

        match self.fold(stage) {
            Ok(Some((exception, records, count))) => {
                let context = stage.context();
                context.insert(keys::EXCEPTION, exception);
                context.insert(keys::SUMMARY, records);
                debug!(
                    stage = %stage.name(),
                    count,
                    "Included expression failures in exception details"
                );
                BestEffort::Applied
            }
            Ok(None) => BestEffort::Skipped,
            Err(err) => {
                error!(
                    stage = %stage.name(),
                    error = %err,
                    kind = err.kind(),
                    "Failed to include expression evaluation errors in context"
                );
                BestEffort::Failed(err)
            }
        }
    }

    /// Builds the updated exception payload and failure records without
    /// touching the context.
    fn fold(&self, stage: &StageExecution) -> Result<Option<(Value, Value, usize)>, ContextError> {
        let context = stage.context();
        let mut records = context.get(keys::SUMMARY).unwrap_or(Value::Null);
        let errors = take_pending(&mut records)?;
        if errors.is_empty() {
            return Ok(None);
        }
        let count = errors.len();

        let exception = match context.get(keys::EXCEPTION) {
            None | Some(Value::Null) => {
                let mut exception = ContextMap::new();
                exception.insert(
                    "details".to_string(),
                    self.formatter.format_details(self.kind, &errors),
                );
                exception
            }
            Some(Value::Object(mut exception)) => {
                let details = exception
                    .entry("details")
                    .or_insert_with(|| Value::Object(ContextMap::new()));
                let Value::Object(details) = details else {
                    return Err(ContextError::malformed_exception("details is not an object"));
                };
                let existing = details
                    .entry("errors")
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(existing) = existing else {
                    return Err(ContextError::malformed_exception("details.errors is not a list"));
                };
                existing.extend(errors.into_iter().map(Value::String));
                exception
            }
            Some(_) => return Err(ContextError::malformed_exception("exception is not an object")),
        };

        Ok(Some((Value::Object(exception), records, count)))
    }
}

/// Collects descriptions of entries not yet marked `included`, in key
/// order, and marks them.
fn take_pending(records: &mut Value) -> Result<Vec<String>, MalformedSummaryError> {
    let Value::Object(records) = records else {
        return Err(MalformedSummaryError::new("expected an object of failure lists"));
    };

    let mut descriptions = Vec::new();
    for (key, entries) in records.iter_mut() {
        let Value::Array(entries) = entries else {
            return Err(MalformedSummaryError::for_key(key.as_str(), "expected a list of failures"));
        };
        for entry in entries {
            let Value::Object(entry) = entry else {
                return Err(MalformedSummaryError::for_key(key.as_str(), "failure is not an object"));
            };
            if entry.get(INCLUDED) == Some(&Value::Bool(true)) {
                continue;
            }
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .ok_or_else(|| MalformedSummaryError::for_key(key.as_str(), "failure has no description"))?
                .to_string();
            entry.insert(INCLUDED.to_string(), Value::Bool(true));
            descriptions.push(description);
        }
    }

    Ok(descriptions)
}
