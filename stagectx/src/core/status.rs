//! Stage status, execution status and execution type enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of run an execution represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// A pipeline run started by a trigger.
    #[default]
    Pipeline,
    /// An ad-hoc orchestration of one or more tasks.
    Orchestration,
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Orchestration => write!(f, "orchestration"),
        }
    }
}

/// The execution status of a stage or execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet dispatched.
    #[default]
    NotStarted,
    /// Currently being processed.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed, but downstream stages may continue.
    FailedContinue,
    /// Failed and halted the branch.
    TerminalFailure,
    /// Skipped by a condition.
    Skipped,
    /// Canceled before completion.
    Canceled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedContinue => write!(f, "failed_continue"),
            Self::TerminalFailure => write!(f, "terminal_failure"),
            Self::Skipped => write!(f, "skipped"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }

    /// Returns true if the stage finished and its outputs are usable downstream.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedContinue | Self::Skipped)
    }
}
