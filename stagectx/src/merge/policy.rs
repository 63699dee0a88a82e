//! Whether evaluation failures exist, and whether they should fail the stage.

use crate::core::{keys, StageExecution};
use serde_json::Value;

/// Evaluation failures are advisory unless the stage opts in to strict
/// behavior with `failOnFailedExpressions: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePolicy;

impl FailurePolicy {
    /// True iff the stage's failure records are present and non-empty.
    ///
    /// Records that are present but malformed count as failures.
    #[must_use]
    pub fn has_failures(stage: &StageExecution) -> bool {
        match stage.context().get(keys::SUMMARY) {
            None | Some(Value::Null) => false,
            Some(Value::Object(records)) => !records.is_empty(),
            Some(Value::Array(records)) => !records.is_empty(),
            Some(Value::String(records)) => !records.is_empty(),
            Some(Value::Bool(_) | Value::Number(_)) => true,
        }
    }

    /// True iff the stage has failures and explicitly opted in to failing.
    ///
    /// A flag that is absent, false or not a boolean yields false.
    #[must_use]
    pub fn should_fail_stage(stage: &StageExecution) -> bool {
        Self::has_failures(stage)
            && matches!(
                stage.context().get(keys::FAIL_ON_FAILED_EXPRESSIONS),
                Some(Value::Bool(true))
            )
    }
}
