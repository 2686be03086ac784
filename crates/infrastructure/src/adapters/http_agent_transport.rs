//! Agent transport adapter - Implements RemoteCommandPort over HTTP
//!
//! The agent gateway runs commands on target hosts:
//! `POST /v1/hosts/{id}/commands` starts one and answers with its id,
//! `DELETE /v1/hosts/{id}/commands/{command}` stops it.

use application::ports::{RemoteCommandPort, StressCommand, StressKind};
use application::ApplicationError;
use async_trait::async_trait;
use domain::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{PlatformError, PlatformHttpClient};

#[derive(Serialize)]
struct CommandRequest {
    kind: StressKind,
    script: String,
    /// Agent-side kill switch, slightly past the command's own timeout
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct CommandResponse {
    command_id: String,
}

/// Grace the agent adds on top of the command duration before killing it
const AGENT_GRACE_SECS: u64 = 30;

/// [`RemoteCommandPort`] backed by the host agent gateway
#[derive(Debug, Clone)]
pub struct HttpAgentTransport {
    client: PlatformHttpClient,
}

impl HttpAgentTransport {
    pub const fn new(client: PlatformHttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteCommandPort for HttpAgentTransport {
    #[instrument(skip(self, command), fields(resource = %resource, kind = ?command.kind))]
    async fn run_command(
        &self,
        resource: &ResourceId,
        command: &StressCommand,
    ) -> Result<String, ApplicationError> {
        let request = CommandRequest {
            kind: command.kind,
            script: command.script(),
            timeout_secs: command.duration_secs.saturating_add(AGENT_GRACE_SECS),
        };

        let response: CommandResponse = self
            .client
            .post_json(&format!("/v1/hosts/{}/commands", resource.as_str()), &request)
            .await?;
        debug!(command_id = %response.command_id, "Command started");
        Ok(response.command_id)
    }

    #[instrument(skip(self), fields(resource = %resource))]
    async fn stop_command(&self, resource: &ResourceId, command_id: &str) -> Result<(), ApplicationError> {
        let path = format!("/v1/hosts/{}/commands/{command_id}", resource.as_str());
        match self.client.delete(&path).await {
            Ok(()) => Ok(()),
            // Finished commands are reaped by the agent
            Err(PlatformError::NotFound(_)) => {
                debug!(command_id, "Command already finished");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}
