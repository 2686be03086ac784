//! Execution lifecycle value objects
//!
//! An execution moves through the phases in a fixed order while its status
//! is `Running`, then lands in exactly one terminal status. Together the two
//! form the orchestrator's state machine:
//!
//! ```text
//! PREPARATION -> INJECTION -> OBSERVATION -> RECOVERY -> VALIDATION -> COMPLETED
//!        \            \             \             \            \
//!         +------------+-------------+-------------+------------+--> FAILED | ABORTED
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Non-terminal phase of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Safety preconditions and baseline capture
    Preparation,
    /// Failure being applied
    Injection,
    /// Failure active, metrics streamed and guarded
    Observation,
    /// Failure removed, waiting for self-healing
    Recovery,
    /// Success criteria evaluated
    Validation,
}

impl Phase {
    /// Phases in execution order
    pub const ORDER: [Self; 5] = [
        Self::Preparation,
        Self::Injection,
        Self::Observation,
        Self::Recovery,
        Self::Validation,
    ];

    /// The phase that follows this one, if any
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Preparation => Some(Self::Injection),
            Self::Injection => Some(Self::Observation),
            Self::Observation => Some(Self::Recovery),
            Self::Recovery => Some(Self::Validation),
            Self::Validation => None,
        }
    }

    /// Stable snake_case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Injection => "injection",
            Self::Observation => "observation",
            Self::Recovery => "recovery",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown phase: {s}"))
    }
}

/// Overall status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Moving through the phases
    #[default]
    Running,
    /// Validation finished; the outcome is in `hypothesis_validated`
    Completed,
    /// Internal error or unresolved removal
    Failed,
    /// Safety violation, timeout or operator abort; rollback has run
    Aborted,
}

impl ExecutionStatus {
    /// Check if this is a terminal state (no further changes possible)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Stable snake_case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Unknown execution status: {s}")),
        }
    }
}
