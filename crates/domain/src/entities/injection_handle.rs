//! Injection handles - Proof of an applied failure and of its removal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::failure_parameters::FailureParameters;
use crate::value_objects::{FailureType, InjectionId, ResourceId};

/// Everything needed to reverse an applied failure
///
/// Handles are persisted as soon as a driver reports success, before the
/// executor moves on, so a restarted orchestrator can still undo them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionHandle {
    pub id: InjectionId,
    pub failure_type: FailureType,
    pub targets: Vec<ResourceId>,
    /// Parameters after clamping to driver limits
    pub parameters: FailureParameters,
    /// Opaque driver data used by `remove`
    #[serde(default)]
    pub driver_state: Value,
    pub applied_at: DateTime<Utc>,
}

impl InjectionHandle {
    /// Create a handle for a failure applied just now
    pub fn new(
        failure_type: FailureType,
        targets: Vec<ResourceId>,
        parameters: FailureParameters,
        driver_state: Value,
    ) -> Self {
        Self {
            id: InjectionId::new(),
            failure_type,
            targets,
            parameters,
            driver_state,
            applied_at: Utc::now(),
        }
    }
}

/// Outcome of one removal attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub handle_id: InjectionId,
    pub removed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the failure may still be active and needs an operator
    #[serde(default)]
    pub manual_intervention: bool,
}

impl RemovalRecord {
    pub fn succeeded(handle_id: InjectionId) -> Self {
        Self {
            handle_id,
            removed_at: Utc::now(),
            success: true,
            error: None,
            manual_intervention: false,
        }
    }

    pub fn failed(handle_id: InjectionId, error: impl Into<String>) -> Self {
        Self {
            handle_id,
            removed_at: Utc::now(),
            success: false,
            error: Some(error.into()),
            manual_intervention: true,
        }
    }
}
