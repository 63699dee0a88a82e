//! Outcome of a best-effort bookkeeping step.

use crate::errors::ContextError;

/// What a best-effort step did.
///
/// A `Failed` outcome has already been logged. It never aborts the
/// evaluation pass; callers may inspect it but are not required to act.
#[derive(Debug)]
#[must_use]
pub enum BestEffort {
    /// The stage context was updated.
    Applied,
    /// There was nothing to do.
    Skipped,
    /// The step gave up and left the stage context as it was.
    Failed(ContextError),
}

impl BestEffort {
    /// Returns true if the step updated the context.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns true if there was nothing to do.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Returns true if the step gave up.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the swallowed error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ContextError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}
