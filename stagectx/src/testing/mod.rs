//! Testing utilities for the merge layer.
//!
//! This module provides:
//! - A small `${...}` evaluator implementing the evaluator contract
//! - Fixtures for executions and stages

mod fixtures;
mod template;

pub use fixtures::{context_map, StageFixture};
pub use template::{TemplateError, TemplateEvaluator};
