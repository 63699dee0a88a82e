//! Stage handlers and the catalog that maps stage types to them.

use super::{EvaluationSummary, ExpressionEvaluator};
use crate::core::StageExecution;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// The handler that owns a stage type.
pub trait StageHandler: Send + Sync + Debug {
    /// The stage type tag this handler is registered under.
    fn stage_type(&self) -> &str;

    /// Returns the pre-processing hook if this handler evaluates its own
    /// expressions.
    fn expression_aware(&self) -> Option<&dyn ExpressionAwareHandler> {
        None
    }
}

/// A handler that pre-processes its stage's expressions before the generic pass.
pub trait ExpressionAwareHandler: Send + Sync {
    /// Evaluates the expressions this handler understands.
    ///
    /// Writes results into the stage context and records attempts and
    /// failures in `summary`. Returns `true` if the generic pass should
    /// still run afterwards.
    fn process_expressions(
        &self,
        stage: &StageExecution,
        evaluator: &dyn ExpressionEvaluator,
        summary: &mut EvaluationSummary,
    ) -> bool;
}

/// Finds the handler registered for a stage.
#[cfg_attr(test, mockall::automock)]
pub trait HandlerLookup: Send + Sync {
    /// Returns the handler for `stage`, or `None` if its type is unknown.
    fn builder_for(&self, stage: &StageExecution) -> Option<Arc<dyn StageHandler>>;
}

/// In-memory catalog of stage handlers keyed by stage type.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn StageHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its stage type, returning any handler it replaced.
    pub fn register(&self, handler: Arc<dyn StageHandler>) -> Option<Arc<dyn StageHandler>> {
        self.handlers
            .insert(handler.stage_type().to_string(), handler)
    }

    /// Gets the handler for a stage type.
    #[must_use]
    pub fn get(&self, stage_type: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(stage_type).map(|h| h.value().clone())
    }

    /// Checks if a stage type is registered.
    #[must_use]
    pub fn contains(&self, stage_type: &str) -> bool {
        self.handlers.contains_key(stage_type)
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns all registered stage types, sorted.
    #[must_use]
    pub fn stage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl HandlerLookup for HandlerRegistry {
    fn builder_for(&self, stage: &StageExecution) -> Option<Arc<dyn StageHandler>> {
        self.get(stage.stage_type())
    }
}
