//! Expression-evaluator versions.

use crate::errors::ContextError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The expression-evaluator generation an execution runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorVersion {
    /// Generic evaluation only.
    V3,
    /// Lets stage handlers pre-process their own expressions.
    #[default]
    V4,
}

impl EvaluatorVersion {
    /// Returns true if stage handlers may run before the generic pass.
    #[must_use]
    pub fn supports_stage_preprocessing(&self) -> bool {
        *self >= Self::V4
    }
}

impl fmt::Display for EvaluatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3 => write!(f, "v3"),
            Self::V4 => write!(f, "v4"),
        }
    }
}

impl FromStr for EvaluatorVersion {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v3" => Ok(Self::V3),
            "v4" => Ok(Self::V4),
            other => Err(ContextError::UnknownEvaluatorVersion(other.to_string())),
        }
    }
}
