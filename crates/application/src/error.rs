//! Application-level errors

use domain::{ChaosError, DomainError};
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Experiment run failure from the chaos taxonomy
    #[error(transparent)]
    Chaos(#[from] ChaosError),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource lock, duplicate id or concurrency cap
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External service error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Operation not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A blocking call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Work was cancelled before it finished
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalService(_) | Self::Timeout(_)
        )
    }

    /// Append `context` to the message, keeping the variant and so its
    /// retryability
    #[must_use]
    pub fn with_context(self, context: &str) -> Self {
        let extend = |message: String| format!("{message}; {context}");
        match self {
            Self::NotFound(m) => Self::NotFound(extend(m)),
            Self::Conflict(m) => Self::Conflict(extend(m)),
            Self::ExternalService(m) => Self::ExternalService(extend(m)),
            Self::InvalidOperation(m) => Self::InvalidOperation(extend(m)),
            Self::Timeout(m) => Self::Timeout(extend(m)),
            Self::Cancelled(m) => Self::Cancelled(extend(m)),
            Self::Configuration(m) => Self::Configuration(extend(m)),
            Self::Internal(m) => Self::Internal(extend(m)),
            other @ (Self::Domain(_) | Self::Chaos(_)) => other,
        }
    }

    /// The chaos taxonomy entry, if this error carries one
    pub const fn as_chaos(&self) -> Option<&ChaosError> {
        match self {
            Self::Chaos(err) => Some(err),
            _ => None,
        }
    }
}
