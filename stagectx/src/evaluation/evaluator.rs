//! The expression-evaluator collaborator contract.

use super::{EvaluationSummary, EvaluatorVersion};
use crate::context::ExecutionSnapshot;
use crate::core::{ContextMap, StageExecution};

/// Resolves expressions embedded in stage-context values.
///
/// Implementations catch per-key evaluation errors themselves and record
/// them in the supplied [`EvaluationSummary`]; `process` never fails as a
/// whole. The bookkeeping keys in [`keys::BOOKKEEPING`](crate::core::keys::BOOKKEEPING)
/// must be copied through unevaluated.
#[cfg_attr(test, mockall::automock)]
pub trait ExpressionEvaluator: Send + Sync {
    /// Returns true if `value` contains expression syntax.
    fn contains_expression(&self, value: &str) -> bool;

    /// Builds a fresh snapshot of the data `stage` may reference.
    fn build_execution_context(&self, stage: &StageExecution) -> ExecutionSnapshot {
        ExecutionSnapshot::for_stage(stage)
    }

    /// Evaluates every entry of `source` against `snapshot`.
    ///
    /// Each key whose value was evaluated is recorded as attempted; keys
    /// that failed are recorded with their failure detail. Failed values
    /// are returned unchanged.
    fn process(
        &self,
        source: &ContextMap,
        snapshot: &ExecutionSnapshot,
        strict: bool,
        summary: &mut EvaluationSummary,
    ) -> ContextMap;

    /// Resolves the version to run for an execution that requested `requested`.
    fn effective_version(&self, requested: Option<EvaluatorVersion>) -> EvaluatorVersion;
}
