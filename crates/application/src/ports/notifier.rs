//! Notifier port - Terminal-state events for operators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Execution, ExecutionId, ExecutionStatus, ExperimentId};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// How urgently a human should look at an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    /// A failure may still be active; manual follow-up required
    Critical,
}

/// Event emitted when an execution terminates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub experiment_id: ExperimentId,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub severity: Severity,
    pub hypothesis_validated: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NotificationEvent {
    /// Build the event for a finished execution
    pub fn for_execution(execution: &Execution, severity: Severity) -> Self {
        Self {
            experiment_id: execution.experiment_id,
            execution_id: execution.id,
            status: execution.status,
            reason: execution.error_message.clone(),
            severity,
            hypothesis_validated: execution.hypothesis_validated,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
        }
    }
}

/// Port for delivering notifications
///
/// Delivery is fire-and-forget: callers log failures and never retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ApplicationError>;
}
