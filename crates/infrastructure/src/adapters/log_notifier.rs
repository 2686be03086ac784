//! Log notifier - Terminal-state events as structured log lines

use application::ports::{NotificationEvent, NotifierPort, Severity};
use application::ApplicationError;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// [`NotifierPort`] that writes each event to the tracing pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub const fn new() -> Self {
        Self
    }

    pub(crate) fn emit(event: &NotificationEvent) {
        let reason = event.reason.as_deref().unwrap_or("");
        match event.severity {
            Severity::Info => info!(
                experiment_id = %event.experiment_id,
                execution_id = %event.execution_id,
                status = %event.status,
                hypothesis_validated = ?event.hypothesis_validated,
                "Execution finished"
            ),
            Severity::Warning => warn!(
                experiment_id = %event.experiment_id,
                execution_id = %event.execution_id,
                status = %event.status,
                reason,
                "Execution finished"
            ),
            Severity::Critical => error!(
                experiment_id = %event.experiment_id,
                execution_id = %event.execution_id,
                status = %event.status,
                reason,
                "Execution finished, manual intervention required"
            ),
        }
    }
}

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ApplicationError> {
        Self::emit(event);
        Ok(())
    }
}
