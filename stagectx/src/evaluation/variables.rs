//! Handler for `evaluateVariables` stages.
//!
//! The stage context carries an ordered `variables` list of `{key, value}`
//! entries. Each value is evaluated in order and becomes visible to the
//! entries after it, so `b = ${a + 1}` can follow `a = ${1}`.

use super::{EvaluationSummary, ExpressionAwareHandler, ExpressionEvaluator, StageHandler};
use crate::core::{ContextMap, StageExecution};
use serde_json::Value;
use tracing::debug;

/// Context key holding the variable list.
pub const VARIABLES: &str = "variables";

/// Stage type handled by [`EvaluateVariablesHandler`].
pub const EVALUATE_VARIABLES: &str = "evaluateVariables";

/// Evaluates an `evaluateVariables` stage's variables one at a time.
///
/// Owns evaluation for its stage type: the generic pass is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateVariablesHandler;

impl EvaluateVariablesHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StageHandler for EvaluateVariablesHandler {
    fn stage_type(&self) -> &str {
        EVALUATE_VARIABLES
    }

    fn expression_aware(&self) -> Option<&dyn ExpressionAwareHandler> {
        Some(self)
    }
}

impl ExpressionAwareHandler for EvaluateVariablesHandler {
    fn process_expressions(
        &self,
        stage: &StageExecution,
        evaluator: &dyn ExpressionEvaluator,
        summary: &mut EvaluationSummary,
    ) -> bool {
        let context = stage.context();
        let Some(Value::Array(variables)) = context.storage().get(VARIABLES) else {
            debug!(stage = %stage.name(), "No variable list to evaluate");
            return false;
        };

        let mut snapshot = evaluator.build_execution_context(stage);
        let mut evaluated = Vec::with_capacity(variables.len());

        for variable in variables {
            let Value::Object(mut entry) = variable else {
                evaluated.push(variable);
                continue;
            };
            let (Some(Value::String(name)), Some(value)) =
                (entry.get("key").cloned(), entry.get("value").cloned())
            else {
                evaluated.push(Value::Object(entry));
                continue;
            };

            let mut single = ContextMap::new();
            single.insert(name.clone(), value);
            let mut local = EvaluationSummary::new();
            let mut result = evaluator.process(&single, &snapshot, true, &mut local);

            if local.was_attempted(&name) {
                summary.record_attempt(VARIABLES);
            }
            for failure in local.failures_for(&name) {
                summary.add_failure(VARIABLES, failure.clone());
            }

            if let Some(resolved) = result.remove(&name) {
                snapshot.insert(name, resolved.clone());
                entry.insert("value".to_string(), resolved);
            }
            evaluated.push(Value::Object(entry));
        }

        context.insert(VARIABLES, Value::Array(evaluated));
        false
    }
}
