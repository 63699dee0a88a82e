//! Error types for the stagectx crate.
//!
//! Per-key evaluation failures are never errors: they are carried as data in
//! an [`EvaluationSummary`](crate::evaluation::EvaluationSummary). The types
//! here describe bookkeeping failures (malformed persisted structures) and
//! configuration problems.

use thiserror::Error;

/// The main error type for stagectx operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The persisted failure-record structure is not shaped as expected.
    #[error("{0}")]
    MalformedSummary(#[from] MalformedSummaryError),

    /// The persisted exception payload is not shaped as expected.
    #[error("Malformed exception payload: {0}")]
    MalformedException(String),

    /// An evaluator version string could not be parsed.
    #[error("Unknown evaluator version: {0}")]
    UnknownEvaluatorVersion(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ContextError {
    /// Creates a malformed exception error.
    #[must_use]
    pub fn malformed_exception(message: impl Into<String>) -> Self {
        Self::MalformedException(message.into())
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedSummary(_) => "malformed_summary",
            Self::MalformedException(_) => "malformed_exception",
            Self::UnknownEvaluatorVersion(_) => "unknown_evaluator_version",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Error raised when the failure-record structure has an unexpected shape.
#[derive(Debug, Clone, Error)]
#[error("Malformed failure records{}: {message}", key.as_ref().map(|k| format!(" for key '{k}'")).unwrap_or_default())]
pub struct MalformedSummaryError {
    /// The offending context key, when the problem is local to one entry.
    pub key: Option<String>,
    /// Description of the problem.
    pub message: String,
}

impl MalformedSummaryError {
    /// Creates an error about the structure as a whole.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            key: None,
            message: message.into(),
        }
    }

    /// Creates an error about a single entry.
    #[must_use]
    pub fn for_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_summary_message() {
        let err = MalformedSummaryError::new("expected an object");
        assert_eq!(err.to_string(), "Malformed failure records: expected an object");

        let err = MalformedSummaryError::for_key("y", "expected a list");
        assert_eq!(
            err.to_string(),
            "Malformed failure records for key 'y': expected a list"
        );
    }

    #[test]
    fn test_malformed_summary_conversion_keeps_key() {
        let err = ContextError::from(MalformedSummaryError::for_key("y", "bad"));

        assert_eq!(err.kind(), "malformed_summary");
        assert!(matches!(&err, ContextError::MalformedSummary(inner) if inner.key.as_deref() == Some("y")));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ContextError::from(parse);
        assert_eq!(err.kind(), "serialization");
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
