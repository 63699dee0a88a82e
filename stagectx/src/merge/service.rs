//! The entry points the queue-handler layer calls on every stage visit.

use super::{
    BestEffort, DefaultExceptionFormatter, ErrorReconciler, ExceptionAggregator,
    ExceptionFormatter, FailurePolicy,
};
use crate::config::MergeConfig;
use crate::context::{ContextOverlay, StageContext};
use crate::core::StageExecution;
use crate::evaluation::{
    EvaluationOrchestrator, EvaluationSummary, ExpressionEvaluator, HandlerLookup,
};
use std::sync::Arc;

/// What one merge pass did.
#[derive(Debug)]
pub struct MergeReport {
    /// Attempts and failures recorded by the pass.
    pub summary: EvaluationSummary,
    /// Whether the generic evaluator ran.
    pub generic_pass: bool,
    /// Outcome of stale-failure reconciliation.
    pub reconciliation: BestEffort,
}

/// Merges freshly evaluated context into stages and keeps their failure
/// bookkeeping current.
///
/// Constructed explicitly with its collaborators; there is no global
/// instance.
pub struct ExpressionAware {
    orchestrator: EvaluationOrchestrator,
    formatter: Arc<dyn ExceptionFormatter>,
}

impl ExpressionAware {
    /// Creates the service with default configuration and formatter.
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>, handlers: Arc<dyn HandlerLookup>) -> Self {
        Self {
            orchestrator: EvaluationOrchestrator::new(evaluator, handlers),
            formatter: Arc::new(DefaultExceptionFormatter),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.orchestrator = self.orchestrator.with_config(config);
        self
    }

    /// Sets the exception formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn ExceptionFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        self.orchestrator.config()
    }

    /// Evaluates the stage context, installs the overlay and prunes stale
    /// failure records. Returns the same stage.
    pub fn with_merged_context<'a>(
        &self,
        stage: &'a Arc<StageExecution>,
    ) -> &'a Arc<StageExecution> {
        let _report = self.merge(stage);
        stage
    }

    /// Like [`with_merged_context`](Self::with_merged_context), returning
    /// what the pass did.
    pub fn merge(&self, stage: &Arc<StageExecution>) -> MergeReport {
        let (processed, summary) = self.orchestrator.process_entries(stage);
        let generic_pass = processed.generic_pass();

        let overlay = ContextOverlay::new(
            processed.into_storage(),
            stage,
            self.orchestrator.evaluator().clone(),
        )
        .with_strict(self.config().strict_evaluation);
        stage.set_context(StageContext::Merged(overlay));

        let reconciliation = self.reconcile(stage, &summary);

        MergeReport {
            summary,
            generic_pass,
            reconciliation,
        }
    }

    /// Removes failure records for keys that now evaluate cleanly.
    pub fn reconcile(&self, stage: &StageExecution, summary: &EvaluationSummary) -> BestEffort {
        ErrorReconciler::reconcile(stage, summary)
    }

    /// Folds remaining failure records into the stage's exception payload.
    pub fn include_evaluation_summary(&self, stage: &StageExecution) -> BestEffort {
        ExceptionAggregator::new(self.formatter.as_ref(), &self.config().summary_error_kind)
            .include_evaluation_summary(stage)
    }

    /// True iff the stage has failure records.
    #[must_use]
    pub fn has_failures(&self, stage: &StageExecution) -> bool {
        FailurePolicy::has_failures(stage)
    }

    /// True iff the stage has failure records and opted in to failing on them.
    #[must_use]
    pub fn should_fail_stage(&self, stage: &StageExecution) -> bool {
        FailurePolicy::should_fail_stage(stage)
    }
}
