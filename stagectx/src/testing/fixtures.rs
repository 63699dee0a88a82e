//! Test fixtures for executions and stages.

use std::sync::Arc;

use serde_json::Value;

use crate::core::{ContextMap, Execution, StageDefinition, StageExecution, StageStatus};
use crate::evaluation::EvaluatorVersion;

/// Converts a JSON object literal into a context map.
///
/// Non-object values produce an empty map.
#[must_use]
pub fn context_map(value: Value) -> ContextMap {
    match value {
        Value::Object(map) => map,
        _ => ContextMap::new(),
    }
}

/// Builds an execution with one stage under test plus optional upstream stages.
#[derive(Debug)]
pub struct StageFixture {
    trigger: Value,
    version: Option<EvaluatorVersion>,
    upstream: Vec<(String, ContextMap, StageStatus)>,
    stage_type: String,
    context: ContextMap,
}

impl StageFixture {
    /// Creates a fixture for a stage of `stage_type`.
    #[must_use]
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            trigger: Value::Object(ContextMap::new()),
            version: None,
            upstream: Vec::new(),
            stage_type: stage_type.into(),
            context: ContextMap::new(),
        }
    }

    /// Sets the trigger payload.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Value) -> Self {
        self.trigger = trigger;
        self
    }

    /// Requests an evaluator version on the execution.
    #[must_use]
    pub fn with_evaluator_version(mut self, version: EvaluatorVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the stage context from a JSON object literal.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context_map(context);
        self
    }

    /// Adds an upstream stage that the stage under test depends on.
    #[must_use]
    pub fn with_upstream(mut self, ref_id: impl Into<String>, outputs: Value, status: StageStatus) -> Self {
        self.upstream.push((ref_id.into(), context_map(outputs), status));
        self
    }

    /// Builds the execution and returns it with the stage under test.
    #[must_use]
    pub fn build(self) -> (Arc<Execution>, Arc<StageExecution>) {
        let mut execution = Execution::new("fixture").with_trigger(self.trigger);
        if let Some(version) = self.version {
            execution = execution.with_evaluator_version(version);
        }
        let execution = execution.into_shared();

        let mut requisites = Vec::new();
        for (ref_id, outputs, status) in self.upstream {
            execution.add_stage(
                StageDefinition::new(ref_id.clone(), "upstream")
                    .with_status(status)
                    .with_outputs(outputs),
            );
            requisites.push(ref_id);
        }

        let requisite_refs: Vec<&str> = requisites.iter().map(String::as_str).collect();
        let stage = execution.add_stage(
            StageDefinition::new("under-test", self.stage_type)
                .with_requisites(&requisite_refs)
                .with_status(StageStatus::Running)
                .with_context(self.context),
        );

        (execution, stage)
    }
}
