//! Stage-context storage and the live overlay installed on each visit.
//!
//! This module provides:
//! - Shared storage for the key/value context a stage persists
//! - The read-intercepting overlay that re-evaluates expressions on read
//! - Execution snapshots that expressions are evaluated against

mod overlay;
mod snapshot;
mod stage_context;
mod store;

pub use overlay::ContextOverlay;
pub use snapshot::ExecutionSnapshot;
pub use stage_context::StageContext;
pub use store::SharedContext;
