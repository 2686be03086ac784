//! Domain-level errors

use thiserror::Error;

use crate::value_objects::{ExecutionStatus, FailureType, InjectionId, Phase};

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Invalid resource identifier
    #[error("Invalid resource id: {0}")]
    InvalidResourceId(String),

    /// Experiment definition failed validation
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Phase transition out of order
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    /// Mutation attempted on a terminal execution
    #[error("Execution already finished with status {0}")]
    AlreadyTerminal(ExecutionStatus),

    /// Completion attempted while injected failures are still open
    #[error("{0} injection handle(s) have no recorded removal")]
    OpenInjections(usize),

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

/// Failure taxonomy of an experiment run
///
/// Every terminal execution that did not complete carries one of these as
/// its human-readable reason.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChaosError {
    /// Targets unhealthy, over the blast radius, or already locked
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Guardrail breached while the failure was active
    #[error("Safety violation: {0}")]
    SafetyViolation(String),

    /// Driver apply exhausted its retries
    #[error("Injection of {failure_type} failed after {attempts} attempt(s): {reason}")]
    InjectionFailed {
        failure_type: FailureType,
        attempts: u32,
        reason: String,
    },

    /// Driver remove failed; the handle needs manual follow-up
    #[error("Removal of injection {handle_id} failed: {reason}")]
    RemovalFailed { handle_id: InjectionId, reason: String },

    /// Targets did not heal within the recovery bound
    #[error("Targets did not recover within {waited_secs}s")]
    RecoveryTimeout { waited_secs: u64 },

    /// Criteria evaluation crashed; the outcome is inconclusive
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ChaosError {
    /// Stable snake_case classification
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::SafetyViolation(_) => "safety_violation",
            Self::InjectionFailed { .. } => "injection_failed",
            Self::RemovalFailed { .. } => "removal_failed",
            Self::RecoveryTimeout { .. } => "recovery_timeout",
            Self::ValidationError(_) => "validation_error",
        }
    }

    /// Whether the condition requires an operator to intervene
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::RemovalFailed { .. })
    }
}
