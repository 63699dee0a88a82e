//! Expression evaluation for stage contexts.
//!
//! This module provides:
//! - The evaluator collaborator contract and version switch
//! - Per-pass evaluation summaries
//! - Stage handlers and the handler catalog
//! - The two-phase evaluation orchestrator

mod evaluator;
mod handler;
mod orchestrator;
mod summary;
mod variables;
mod version;

#[cfg(test)]
pub use evaluator::MockExpressionEvaluator;
pub use evaluator::ExpressionEvaluator;
#[cfg(test)]
pub use handler::MockHandlerLookup;
pub use handler::{ExpressionAwareHandler, HandlerLookup, HandlerRegistry, StageHandler};
pub use orchestrator::{EvaluationOrchestrator, ProcessedContext};
pub use summary::{EvaluationSummary, FailureEntry, FailureLevel};
pub use variables::{EvaluateVariablesHandler, EVALUATE_VARIABLES, VARIABLES};
pub use version::EvaluatorVersion;
