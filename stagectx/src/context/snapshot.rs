//! Execution-context snapshots: the root that expressions are evaluated against.

use crate::core::{keys, ContextMap, StageExecution};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A point-in-time view of the data an expression may reference.
///
/// Snapshots are rebuilt for every evaluation and never cached, so they
/// always reflect the latest outputs of upstream stages.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSnapshot {
    root: ContextMap,
    built_at: DateTime<Utc>,
}

impl Default for ExecutionSnapshot {
    fn default() -> Self {
        Self::new(ContextMap::new())
    }
}

impl ExecutionSnapshot {
    /// Creates a snapshot over an explicit root.
    #[must_use]
    pub fn new(root: ContextMap) -> Self {
        Self {
            root,
            built_at: Utc::now(),
        }
    }

    /// Builds a fresh snapshot for `stage`.
    ///
    /// Layering, later entries winning: outputs of completed ancestors
    /// (farthest first), the stage's stored context, then the owning
    /// execution's `trigger` and `execution`.
    #[must_use]
    pub fn for_stage(stage: &StageExecution) -> Self {
        let mut root = ContextMap::new();

        for ancestor in stage.ancestors().iter().rev() {
            if ancestor.status().is_complete() {
                root.extend(ancestor.outputs());
            }
        }

        root.extend(stage.context().to_map());

        if let Some(execution) = stage.execution() {
            root.insert(keys::TRIGGER.to_string(), execution.trigger().clone());
            root.insert(keys::EXECUTION.to_string(), execution.to_value());
        }

        Self::new(root)
    }

    /// Returns the root mapping.
    #[must_use]
    pub fn root(&self) -> &ContextMap {
        &self.root
    }

    /// Returns when the snapshot was built.
    #[must_use]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Gets a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Adds or replaces a top-level value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Resolves a dotted path such as `trigger.buildInfo.number` or
    /// `images.0.name`. Numeric segments index into arrays.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?.trim())?;

        for segment in segments {
            let segment = segment.trim();
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Execution, StageDefinition, StageStatus};
    use serde_json::json;

    fn map(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_lookup_paths() {
        let snapshot = ExecutionSnapshot::new(map(json!({
            "trigger": {"buildInfo": {"number": 42}},
            "images": [{"name": "api"}, {"name": "web"}],
        })));

        assert_eq!(snapshot.lookup("trigger.buildInfo.number"), Some(&json!(42)));
        assert_eq!(snapshot.lookup("images.1.name"), Some(&json!("web")));
        assert_eq!(snapshot.lookup("images.7.name"), None);
        assert_eq!(snapshot.lookup("images.name"), None);
        assert_eq!(snapshot.lookup("missing"), None);
    }

    #[test]
    fn test_for_stage_layers_ancestor_outputs() {
        let execution = Execution::new("app")
            .with_trigger(json!({"tag": "v1"}))
            .into_shared();
        execution.add_stage(
            StageDefinition::new("1", "bake")
                .with_status(StageStatus::Succeeded)
                .with_outputs(map(json!({"image": "old", "region": "us-east-1"}))),
        );
        execution.add_stage(
            StageDefinition::new("2", "bake")
                .with_requisites(&["1"])
                .with_status(StageStatus::Succeeded)
                .with_outputs(map(json!({"image": "new"}))),
        );
        execution.add_stage(
            StageDefinition::new("3", "bake")
                .with_status(StageStatus::Running)
                .with_outputs(map(json!({"pending": true}))),
        );
        let stage = execution.add_stage(
            StageDefinition::new("4", "deploy")
                .with_requisites(&["2", "3"])
                .with_context(map(json!({"region": "eu-west-1", "trigger": "stored"}))),
        );

        let snapshot = ExecutionSnapshot::for_stage(&stage);

        assert_eq!(snapshot.get("image"), Some(&json!("new")));
        assert_eq!(snapshot.get("region"), Some(&json!("eu-west-1")));
        assert_eq!(snapshot.get("pending"), None);
        assert_eq!(snapshot.lookup("trigger.tag"), Some(&json!("v1")));
        assert_eq!(snapshot.lookup("execution.application"), Some(&json!("app")));
    }
}
