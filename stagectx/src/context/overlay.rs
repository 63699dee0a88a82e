//! A read-intercepting view over a stage's processed context.

use super::SharedContext;
use crate::core::{keys, ContextMap, Execution, StageExecution};
use crate::evaluation::{EvaluationSummary, ExpressionEvaluator};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Live overlay over a stage context.
///
/// Only [`get`](Self::get) differs from the underlying storage:
/// - `trigger` and `execution` always resolve to the owning execution,
///   whatever is stored under those keys;
/// - a stored string containing expression syntax is re-evaluated against a
///   freshly built snapshot on every read. Results are never cached.
///
/// Every other operation forwards to the shared storage, so writes through
/// the overlay land in the map the stage persists.
#[derive(Clone)]
pub struct ContextOverlay {
    storage: SharedContext,
    stage: Weak<StageExecution>,
    execution: Weak<Execution>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    strict: bool,
}

impl ContextOverlay {
    /// Wraps `storage` for `stage`, re-evaluating reads with `evaluator`.
    #[must_use]
    pub fn new(
        storage: SharedContext,
        stage: &Arc<StageExecution>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        let execution = stage
            .execution()
            .map_or_else(Weak::new, |e| Arc::downgrade(&e));
        Self {
            storage,
            stage: Arc::downgrade(stage),
            execution,
            evaluator,
            strict: true,
        }
    }

    /// Sets the strictness passed to the evaluator on re-evaluation.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Reads a value, resolving reserved keys and re-evaluating expressions.
    ///
    /// Reserved keys resolve to `None` once the execution is gone. If the
    /// stage itself is gone the stored value is returned as is.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            keys::TRIGGER => return self.execution().map(|e| e.trigger().clone()),
            keys::EXECUTION => return self.execution().map(|e| e.to_value()),
            _ => {}
        }

        let stored = self.storage.get(key)?;
        let needs_evaluation = matches!(&stored, Value::String(text) if self.evaluator.contains_expression(text));
        if !needs_evaluation {
            return Some(stored);
        }

        let Some(stage) = self.stage.upgrade() else {
            return Some(stored);
        };

        let snapshot = self.evaluator.build_execution_context(&stage);
        let mut single = ContextMap::new();
        single.insert(key.to_string(), stored.clone());

        let mut summary = EvaluationSummary::new();
        let mut evaluated = self
            .evaluator
            .process(&single, &snapshot, self.strict, &mut summary);

        if summary.has_failed(key) {
            warn!(
                stage = %stage.name(),
                key = %key,
                failures = summary.failures_for(key).len(),
                "Expression did not resolve on read"
            );
        }

        evaluated.remove(key).or(Some(stored))
    }

    /// Resolves every key through [`get`](Self::get).
    #[must_use]
    pub fn resolve_all(&self) -> ContextMap {
        self.storage
            .keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|v| (k, v)))
            .collect()
    }

    /// Returns the owning execution, if it is still alive.
    #[must_use]
    pub fn execution(&self) -> Option<Arc<Execution>> {
        self.execution.upgrade()
    }

    /// Returns the underlying storage handle.
    #[must_use]
    pub fn storage(&self) -> &SharedContext {
        &self.storage
    }

    /// Inserts a value into the underlying storage.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.storage.insert(key, value)
    }

    /// Removes a value from the underlying storage.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.storage.remove(key)
    }

    /// Mutates a stored value in place.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.storage.update(key, f)
    }

    /// Checks if a key is stored.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }

    /// Returns stored keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.storage.keys()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Returns a copy of the stored (unevaluated) entries.
    #[must_use]
    pub fn to_map(&self) -> ContextMap {
        self.storage.to_map()
    }
}

impl fmt::Debug for ContextOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOverlay")
            .field("storage", &self.storage)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}
