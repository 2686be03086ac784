//! Webhook notifier - POSTs terminal-state events as JSON

use std::time::Duration;

use application::ports::{NotificationEvent, NotifierPort};
use application::ApplicationError;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::log_notifier::LogNotifier;

/// [`NotifierPort`] that delivers each event to an HTTP endpoint
///
/// Every event is also logged, so nothing is lost when the endpoint is
/// down. Delivery is attempted once.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to initialize.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ApplicationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApplicationError::Internal(format!("Failed to build webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotifierPort for WebhookNotifier {
    #[instrument(skip(self, event), fields(execution_id = %event.execution_id))]
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ApplicationError> {
        LogNotifier::emit(event);

        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| ApplicationError::ExternalService(format!("Webhook delivery failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApplicationError::ExternalService(format!(
                "Webhook answered HTTP {status}"
            )));
        }

        debug!(%status, "Webhook delivered");
        Ok(())
    }
}
