//! Merging of evaluated context into stages, and failure bookkeeping.
//!
//! Per stage visit: evaluate, install the overlay, prune stale failure
//! records. When reporting, fold remaining failures into the exception
//! payload and consult the failure policy.
//!
//! The steps mutate the stage context one after another with no rollback:
//! if a later step gives up, earlier mutations stay in place.

mod aggregator;
mod exception;
#[cfg(test)]
mod merge_tests;
mod outcome;
mod policy;
mod reconciler;
mod service;

pub use aggregator::ExceptionAggregator;
pub use exception::{DefaultExceptionFormatter, ExceptionFormatter};
pub use outcome::BestEffort;
pub use policy::FailurePolicy;
pub use reconciler::ErrorReconciler;
pub use service::{ExpressionAware, MergeReport};
