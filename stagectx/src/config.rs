//! Configuration for the merge layer.

use crate::errors::ContextError;
use crate::evaluation::EvaluatorVersion;
use serde::{Deserialize, Serialize};

/// Configuration shared by the orchestrator and the merge service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    /// Version used when an execution does not request one.
    #[serde(default)]
    pub default_evaluator_version: EvaluatorVersion,
    /// Strictness passed to the evaluator.
    #[serde(default = "default_strict_evaluation")]
    pub strict_evaluation: bool,
    /// Kind passed to the exception formatter for evaluation failures.
    #[serde(default = "default_summary_error_kind")]
    pub summary_error_kind: String,
}

fn default_strict_evaluation() -> bool {
    true
}

fn default_summary_error_kind() -> String {
    "expressionEvaluationSummary".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_evaluator_version: EvaluatorVersion::default(),
            strict_evaluation: default_strict_evaluation(),
            summary_error_kind: default_summary_error_kind(),
        }
    }
}

impl MergeConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration; missing fields take their defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ContextError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the default evaluator version.
    #[must_use]
    pub fn with_default_evaluator_version(mut self, version: EvaluatorVersion) -> Self {
        self.default_evaluator_version = version;
        self
    }

    /// Sets evaluator strictness.
    #[must_use]
    pub fn with_strict_evaluation(mut self, strict: bool) -> Self {
        self.strict_evaluation = strict;
        self
    }

    /// Sets the error kind used in exception payloads.
    #[must_use]
    pub fn with_summary_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.summary_error_kind = kind.into();
        self
    }
}
