//! Two-phase evaluation: stage-specific pre-processing, then the generic pass.

use super::{EvaluationSummary, EvaluatorVersion, ExpressionEvaluator, HandlerLookup};
use crate::config::MergeConfig;
use crate::context::SharedContext;
use crate::core::{keys, ContextMap, StageExecution};
use crate::errors::MalformedSummaryError;
use std::sync::Arc;
use tracing::{debug, error};

/// The context produced by one evaluation pass.
#[derive(Debug, Clone)]
pub struct ProcessedContext {
    storage: SharedContext,
    generic_pass: bool,
}

impl ProcessedContext {
    /// Returns the storage holding the processed entries.
    #[must_use]
    pub fn storage(&self) -> &SharedContext {
        &self.storage
    }

    /// Returns true if the generic evaluator ran.
    #[must_use]
    pub fn generic_pass(&self) -> bool {
        self.generic_pass
    }

    /// Consumes the result, returning the storage.
    #[must_use]
    pub fn into_storage(self) -> SharedContext {
        self.storage
    }
}

/// Runs the evaluation protocol for a stage visit.
pub struct EvaluationOrchestrator {
    evaluator: Arc<dyn ExpressionEvaluator>,
    handlers: Arc<dyn HandlerLookup>,
    config: MergeConfig,
}

impl EvaluationOrchestrator {
    /// Creates an orchestrator with default configuration.
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>, handlers: Arc<dyn HandlerLookup>) -> Self {
        Self {
            evaluator,
            handlers,
            config: MergeConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Resolves the evaluator version for the stage's execution.
    #[must_use]
    pub fn effective_version(&self, stage: &StageExecution) -> EvaluatorVersion {
        let requested = stage
            .execution()
            .and_then(|e| e.evaluator_version())
            .unwrap_or(self.config.default_evaluator_version);
        self.evaluator.effective_version(Some(requested))
    }

    /// Evaluates the stage context, returning the processed entries and
    /// what was attempted.
    ///
    /// Failures from this pass are folded into the `summary` key of the
    /// processed entries. When the stage's handler asks to skip the generic
    /// pass, the processed storage is the stage's own storage.
    pub fn process_entries(&self, stage: &StageExecution) -> (ProcessedContext, EvaluationSummary) {
        let mut summary = EvaluationSummary::new();
        let version = self.effective_version(stage);

        let mut should_continue = true;
        if version.supports_stage_preprocessing() {
            if let Some(handler) = self.handlers.builder_for(stage) {
                if let Some(aware) = handler.expression_aware() {
                    should_continue =
                        aware.process_expressions(stage, self.evaluator.as_ref(), &mut summary);
                    debug!(
                        stage = %stage.name(),
                        stage_type = %stage.stage_type(),
                        attempted = summary.total_evaluated(),
                        should_continue,
                        "Stage handler pre-processed expressions"
                    );
                }
            }
        }

        if !should_continue {
            let storage = stage.context().storage().clone();
            if let Err(err) = fold_into_storage(&summary, &storage) {
                error!(stage = %stage.name(), error = %err, "Failed to record evaluation failures");
            }
            return (
                ProcessedContext {
                    storage,
                    generic_pass: false,
                },
                summary,
            );
        }

        let source = stage.context().to_map();
        let snapshot = self.evaluator.build_execution_context(stage);
        let mut processed =
            self.evaluator
                .process(&source, &snapshot, self.config.strict_evaluation, &mut summary);

        if let Err(err) = summary.merge_into(&mut processed) {
            error!(stage = %stage.name(), error = %err, "Failed to record evaluation failures");
        }

        debug!(
            stage = %stage.name(),
            version = %version,
            attempted = summary.total_evaluated(),
            failures = summary.failure_count(),
            "Evaluated stage context"
        );

        (
            ProcessedContext {
                storage: SharedContext::from_map(processed),
                generic_pass: true,
            },
            summary,
        )
    }
}

fn fold_into_storage(
    summary: &EvaluationSummary,
    storage: &SharedContext,
) -> Result<(), MalformedSummaryError> {
    let mut records = ContextMap::new();
    if let Some(existing) = storage.get(keys::SUMMARY) {
        records.insert(keys::SUMMARY.to_string(), existing);
    }
    summary.merge_into(&mut records)?;
    if let Some(merged) = records.remove(keys::SUMMARY) {
        storage.insert(keys::SUMMARY, merged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Execution, StageDefinition};
    use crate::evaluation::{
        ExpressionAwareHandler, FailureEntry, MockExpressionEvaluator, MockHandlerLookup,
        StageHandler,
    };
    use crate::testing::TemplateEvaluator;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn map(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[derive(Debug)]
    struct SelfEvaluating {
        continue_generic: bool,
    }

    impl StageHandler for SelfEvaluating {
        fn stage_type(&self) -> &str {
            "selfEvaluating"
        }

        fn expression_aware(&self) -> Option<&dyn ExpressionAwareHandler> {
            Some(self)
        }
    }

    impl ExpressionAwareHandler for SelfEvaluating {
        fn process_expressions(
            &self,
            stage: &StageExecution,
            _evaluator: &dyn ExpressionEvaluator,
            summary: &mut EvaluationSummary,
        ) -> bool {
            stage.context().insert("owned", json!("handled"));
            summary.record_attempt("owned");
            summary.add_failure("broken", FailureEntry::new("handler could not resolve"));
            self.continue_generic
        }
    }

    fn lookup_returning(handler: Option<Arc<dyn StageHandler>>) -> Arc<MockHandlerLookup> {
        let mut lookup = MockHandlerLookup::new();
        lookup
            .expect_builder_for()
            .returning(move |_| handler.clone());
        Arc::new(lookup)
    }

    #[test]
    fn test_generic_pass_evaluates_whole_context() {
        let execution = Execution::new("app").into_shared();
        let stage = execution.add_stage(
            StageDefinition::new("1", "wait").with_context(map(json!({"x": "${1+1}", "n": 3}))),
        );
        let orchestrator =
            EvaluationOrchestrator::new(Arc::new(TemplateEvaluator::new()), lookup_returning(None));

        let (processed, summary) = orchestrator.process_entries(&stage);

        assert!(processed.generic_pass());
        assert_eq!(processed.storage().to_map(), map(json!({"x": 2, "n": 3})));
        assert!(summary.succeeded("x"));
        assert!(!summary.was_attempted("n"));
        assert_eq!(stage.context().get("x"), Some(json!("${1+1}")));
    }

    #[test]
    fn test_generic_pass_records_failures_in_summary_key() {
        let execution = Execution::new("app").into_shared();
        let stage = execution.add_stage(
            StageDefinition::new("1", "wait").with_context(map(json!({"y": "${missing.ref}"}))),
        );
        let orchestrator =
            EvaluationOrchestrator::new(Arc::new(TemplateEvaluator::new()), lookup_returning(None));

        let (processed, summary) = orchestrator.process_entries(&stage);

        assert!(summary.has_failed("y"));
        let records = processed.storage().get(keys::SUMMARY).unwrap();
        assert_eq!(records["y"].as_array().unwrap().len(), 1);
        assert_eq!(processed.storage().get("y"), Some(json!("${missing.ref}")));
    }

    #[test]
    fn test_handler_can_skip_generic_pass() {
        let execution = Execution::new("app").into_shared();
        let stage = execution.add_stage(
            StageDefinition::new("1", "selfEvaluating")
                .with_context(map(json!({"x": "${1+1}"}))),
        );
        let mut evaluator = MockExpressionEvaluator::new();
        evaluator
            .expect_effective_version()
            .returning(|requested| requested.unwrap_or_default());
        evaluator.expect_process().never();
        let orchestrator = EvaluationOrchestrator::new(
            Arc::new(evaluator),
            lookup_returning(Some(Arc::new(SelfEvaluating {
                continue_generic: false,
            }))),
        );

        let (processed, summary) = orchestrator.process_entries(&stage);

        assert!(!processed.generic_pass());
        assert!(processed.storage().ptr_eq(stage.context().storage()));
        assert_eq!(processed.storage().get("x"), Some(json!("${1+1}")));
        assert_eq!(processed.storage().get("owned"), Some(json!("handled")));
        assert!(summary.succeeded("owned"));
        assert!(processed.storage().get(keys::SUMMARY).unwrap()["broken"].is_array());
    }

    #[test]
    fn test_handler_can_request_continuation() {
        let execution = Execution::new("app").into_shared();
        let stage = execution.add_stage(
            StageDefinition::new("1", "selfEvaluating")
                .with_context(map(json!({"x": "${1+1}"}))),
        );
        let orchestrator = EvaluationOrchestrator::new(
            Arc::new(TemplateEvaluator::new()),
            lookup_returning(Some(Arc::new(SelfEvaluating {
                continue_generic: true,
            }))),
        );

        let (processed, summary) = orchestrator.process_entries(&stage);

        assert!(processed.generic_pass());
        assert_eq!(processed.storage().get("x"), Some(json!(2)));
        assert_eq!(processed.storage().get("owned"), Some(json!("handled")));
        assert!(summary.has_failed("broken"));
        assert!(summary.succeeded("x"));
    }

    #[test]
    fn test_v3_never_consults_handlers() {
        let execution = Execution::new("app")
            .with_evaluator_version(EvaluatorVersion::V3)
            .into_shared();
        let stage = execution.add_stage(
            StageDefinition::new("1", "selfEvaluating")
                .with_context(map(json!({"x": "${1+1}"}))),
        );
        let mut lookup = MockHandlerLookup::new();
        lookup.expect_builder_for().never();
        let orchestrator =
            EvaluationOrchestrator::new(Arc::new(TemplateEvaluator::new()), Arc::new(lookup));

        let (processed, _) = orchestrator.process_entries(&stage);

        assert!(processed.generic_pass());
        assert_eq!(processed.storage().get("owned"), None);
    }

    #[test]
    fn test_config_default_version_applies_when_execution_is_silent() {
        let execution = Execution::new("app").into_shared();
        let stage = execution.add_stage(StageDefinition::new("1", "wait"));
        let orchestrator =
            EvaluationOrchestrator::new(Arc::new(TemplateEvaluator::new()), lookup_returning(None))
                .with_config(
                    MergeConfig::new().with_default_evaluator_version(EvaluatorVersion::V3),
                );

        assert_eq!(orchestrator.effective_version(&stage), EvaluatorVersion::V3);
    }
}
