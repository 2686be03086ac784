//! Target platform endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the orchestrator reaches the infrastructure it breaks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the control plane API (health, metrics, faults)
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    /// Base URL of the host agent gateway (stress commands)
    #[serde(default = "default_agent_url")]
    pub agent_url: String,

    /// Bearer token sent to both endpoints
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request HTTP timeout (default: 15s)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_control_plane_url() -> String {
    "http://localhost:8500".to_string()
}

fn default_agent_url() -> String {
    "http://localhost:8600".to_string()
}

const fn default_request_timeout() -> u64 {
    15
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            control_plane_url: default_control_plane_url(),
            agent_url: default_agent_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl PlatformConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
