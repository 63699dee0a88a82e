//! Removal of stale failure records once their keys evaluate cleanly.
//!
//! Expressions are evaluated on every visit. A key that failed while its
//! upstream data was missing may resolve on a later visit; its old failure
//! record must then disappear, or users would see an error next to a value
//! that is plainly resolved.

use super::{BestEffort, FailurePolicy};
use crate::core::{keys, StageExecution};
use crate::errors::{ContextError, MalformedSummaryError};
use crate::evaluation::EvaluationSummary;
use serde_json::Value;
use tracing::{debug, error};

/// Prunes failure records for keys that were re-attempted and succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReconciler;

impl ErrorReconciler {
    /// Removes records for keys `summary` shows as attempted and not failed.
    ///
    /// Records for keys that were not attempted, or that failed again, are
    /// left untouched. Malformed records are logged and left as they were.
    pub fn reconcile(stage: &StageExecution, summary: &EvaluationSummary) -> BestEffort {
        if !FailurePolicy::has_failures(stage) {
            return BestEffort::Skipped;
        }

        let outcome = stage
            .context()
            .update(keys::SUMMARY, |records| prune(records, summary));

        match outcome {
            Some(Ok(removed)) if removed.is_empty() => BestEffort::Skipped,
            Some(Ok(removed)) => {
                debug!(
                    stage = %stage.name(),
                    removed = ?removed,
                    "Removed stale expression failures"
                );
                BestEffort::Applied
            }
            Some(Err(err)) => {
                let err = ContextError::from(err);
                error!(
                    stage = %stage.name(),
                    error = %err,
                    kind = err.kind(),
                    "Failed to remove stale expression errors"
                );
                BestEffort::Failed(err)
            }
            None => BestEffort::Skipped,
        }
    }
}

fn prune(
    records: &mut Value,
    summary: &EvaluationSummary,
) -> Result<Vec<String>, MalformedSummaryError> {
    let Value::Object(records) = records else {
        return Err(MalformedSummaryError::new("expected an object of failure lists"));
    };

    let stale: Vec<String> = records
        .keys()
        .filter(|key| summary.succeeded(key))
        .cloned()
        .collect();
    for key in &stale {
        records.shift_remove(key);
    }

    Ok(stale)
}
