//! Formatting of the user-visible exception payload.

use chrono::Utc;
use serde_json::{json, Value};

/// Builds the `details` object of a stage's exception payload.
pub trait ExceptionFormatter: Send + Sync {
    /// Formats `errors` reported under `kind`.
    ///
    /// The result must be an object with an `errors` string list.
    fn format_details(&self, kind: &str, errors: &[String]) -> Value;
}

/// Produces `{error, errors, timestamp}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExceptionFormatter;

impl ExceptionFormatter for DefaultExceptionFormatter {
    fn format_details(&self, kind: &str, errors: &[String]) -> Value {
        json!({
            "error": kind,
            "errors": errors,
            "timestamp": Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formatter_shape() {
        let details = DefaultExceptionFormatter
            .format_details("expressionEvaluationSummary", &["bad ref".to_string()]);

        assert_eq!(details["error"], json!("expressionEvaluationSummary"));
        assert_eq!(details["errors"], json!(["bad ref"]));
        assert!(details["timestamp"].is_i64());
    }
}
