//! # Stagectx
//!
//! Context merging and expression-failure bookkeeping for stage executions.
//!
//! On every visit to a stage, the stage's context is evaluated, wrapped in a
//! live overlay and its failure records are reconciled:
//!
//! - **Two-phase evaluation**: stage handlers may pre-process their own
//!   expressions before the generic evaluator runs
//! - **Live overlay**: reads re-evaluate expressions against fresh upstream
//!   data; `trigger` and `execution` always resolve to the owning execution
//! - **Failure bookkeeping**: stale failure records are pruned, remaining
//!   ones are folded into the stage's exception payload
//! - **Failure policy**: failures are advisory unless the stage opts in
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagectx::prelude::*;
//!
//! let service = ExpressionAware::new(evaluator, Arc::new(HandlerRegistry::new()));
//!
//! let stage = service.with_merged_context(&stage);
//! if service.should_fail_stage(stage) {
//!     // mark the stage as a terminal failure
//! }
//! let _ = service.include_evaluation_summary(stage);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod evaluation;
pub mod merge;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::MergeConfig;
    pub use crate::context::{ContextOverlay, ExecutionSnapshot, SharedContext, StageContext};
    pub use crate::core::{
        ContextMap, Execution, ExecutionType, StageDefinition, StageExecution, StageStatus,
    };
    pub use crate::errors::{ContextError, MalformedSummaryError};
    pub use crate::evaluation::{
        EvaluateVariablesHandler, EvaluationOrchestrator, EvaluationSummary, EvaluatorVersion,
        ExpressionAwareHandler, ExpressionEvaluator, FailureEntry, FailureLevel, HandlerLookup,
        HandlerRegistry, StageHandler,
    };
    pub use crate::merge::{
        BestEffort, DefaultExceptionFormatter, ErrorReconciler, ExceptionAggregator,
        ExceptionFormatter, ExpressionAware, FailurePolicy, MergeReport,
    };
}
