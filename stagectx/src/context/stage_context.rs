//! The context handle a stage carries.

use super::{ContextOverlay, SharedContext};
use crate::core::ContextMap;
use serde_json::Value;

/// A stage's context: raw storage until the first merge, an overlay after.
///
/// Both variants expose the same map operations. Only `get` differs:
/// the merged variant resolves reserved keys and re-evaluates expressions.
#[derive(Debug, Clone)]
pub enum StageContext {
    /// Plain storage, as materialized by the orchestrator.
    Raw(SharedContext),
    /// Storage wrapped in a live overlay.
    Merged(ContextOverlay),
}

impl Default for StageContext {
    fn default() -> Self {
        Self::Raw(SharedContext::new())
    }
}

impl StageContext {
    /// Returns the underlying storage handle.
    #[must_use]
    pub fn storage(&self) -> &SharedContext {
        match self {
            Self::Raw(storage) => storage,
            Self::Merged(overlay) => overlay.storage(),
        }
    }

    /// Returns true once an overlay has been installed.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }

    /// Returns the overlay, if installed.
    #[must_use]
    pub fn as_overlay(&self) -> Option<&ContextOverlay> {
        match self {
            Self::Raw(_) => None,
            Self::Merged(overlay) => Some(overlay),
        }
    }

    /// Reads a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Raw(storage) => storage.get(key),
            Self::Merged(overlay) => overlay.get(key),
        }
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.storage().insert(key, value)
    }

    /// Removes a value, returning it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.storage().remove(key)
    }

    /// Mutates a stored value in place.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.storage().update(key, f)
    }

    /// Checks if a key is stored.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.storage().contains_key(key)
    }

    /// Returns stored keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.storage().keys()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage().is_empty()
    }

    /// Returns a copy of the stored (unevaluated) entries.
    #[must_use]
    pub fn to_map(&self) -> ContextMap {
        self.storage().to_map()
    }
}
