//! Reserved stage-context keys.

/// Resolves to the owning execution's trigger on every read.
pub const TRIGGER: &str = "trigger";

/// Resolves to the owning execution on every read.
pub const EXECUTION: &str = "execution";

/// Persisted failure records: `{key: [{description, ...}]}`.
pub const SUMMARY: &str = "summary";

/// Persisted exception payload: `{details: {errors: [...]}}`.
pub const EXCEPTION: &str = "exception";

/// Opt-in flag that makes evaluation failures fatal for the stage.
pub const FAIL_ON_FAILED_EXPRESSIONS: &str = "failOnFailedExpressions";

/// Keys an evaluator must copy through without evaluating.
pub const BOOKKEEPING: [&str; 2] = [SUMMARY, EXCEPTION];

/// Returns true for keys that hold bookkeeping rather than user input.
#[must_use]
pub fn is_bookkeeping(key: &str) -> bool {
    BOOKKEEPING.contains(&key)
}
