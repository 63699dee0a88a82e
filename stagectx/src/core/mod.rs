//! Core domain types: executions, stages, statuses and reserved keys.

mod execution;
pub mod keys;
mod status;

pub use execution::{Execution, StageDefinition, StageExecution};
pub use status::{ExecutionType, StageStatus};

/// An ordered mapping from context keys to dynamically-typed values.
pub type ContextMap = serde_json::Map<String, serde_json::Value>;
