//! Shared, thread-safe storage for a stage context.

use crate::core::ContextMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A shared handle to the key/value storage a stage persists.
///
/// Cloning the handle does not copy the map: every clone reads and writes
/// the same storage.
#[derive(Clone, Default)]
pub struct SharedContext {
    data: Arc<RwLock<ContextMap>>,
}

impl SharedContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from existing data.
    #[must_use]
    pub fn from_map(data: ContextMap) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Gets a stored value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Removes a value, returning it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().shift_remove(key)
    }

    /// Mutates a stored value in place under the write lock.
    ///
    /// Returns `None` when the key is absent; `f` is not called in that case.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.data.write().get_mut(key).map(f)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_map(&self) -> ContextMap {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Returns true if both handles point at the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.data.read().iter()).finish()
    }
}

impl From<ContextMap> for SharedContext {
    fn from(data: ContextMap) -> Self {
        Self::from_map(data)
    }
}
