//! Remote command port
//!
//! Resource stress runs as a command on the target host through an agent.

use async_trait::async_trait;
use domain::ResourceId;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Which resource a stress command exhausts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    Cpu,
    Memory,
    Disk,
}

/// A bounded stress command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressCommand {
    pub kind: StressKind,
    /// Target load or fill level in percent
    pub intensity_percent: u8,
    /// The command stops by itself after this many seconds
    pub duration_secs: u64,
}

impl StressCommand {
    /// Shell script run by the agent
    pub fn script(&self) -> String {
        let pct = self.intensity_percent;
        let secs = self.duration_secs;
        match self.kind {
            StressKind::Cpu => format!("stress-ng --cpu 0 --cpu-load {pct} --timeout {secs}s"),
            StressKind::Memory => format!("stress-ng --vm 1 --vm-bytes {pct}% --timeout {secs}s"),
            StressKind::Disk => {
                format!("fallocate -l $(( $(df --output=avail -B1 / | tail -1) * {pct} / 100 )) /tmp/chaos-fill && sleep {secs}; rm -f /tmp/chaos-fill")
            },
        }
    }
}

/// Port for running commands on target hosts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteCommandPort: Send + Sync {
    /// Start a command and return its agent-side id
    async fn run_command(
        &self,
        resource: &ResourceId,
        command: &StressCommand,
    ) -> Result<String, ApplicationError>;

    /// Stop a running command; stopping a finished command succeeds
    async fn stop_command(&self, resource: &ResourceId, command_id: &str) -> Result<(), ApplicationError>;
}
