//! Resource stress driver
//!
//! Starts a bounded stress command on each target host. Commands stop by
//! themselves once `duration_secs` elapses, so a lost orchestrator never
//! leaves a host saturated for long.

use std::sync::Arc;

use application::ports::{FailureDriver, RemoteCommandPort, StressCommand, StressKind};
use application::ApplicationError;
use async_trait::async_trait;
use domain::{DURATION_PARAM, FailureParameters, FailureType, InjectionHandle, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{apply_each, decode_state, encode_state, removal_result, whole};
use crate::config::DriverLimits;

/// Longest self-expiry a stress command may get
const MAX_DURATION_SECS: f64 = 86_400.0;
const DEFAULT_DURATION_SECS: f64 = 60.0;

#[derive(Debug, Serialize, Deserialize)]
struct RunningCommand {
    resource: ResourceId,
    command_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StressState {
    commands: Vec<RunningCommand>,
}

/// Driver for CPU, memory and disk pressure
pub struct StressDriver {
    kind: StressKind,
    agent: Arc<dyn RemoteCommandPort>,
    max_percent: f64,
    default_percent: f64,
}

impl std::fmt::Debug for StressDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StressDriver")
            .field("kind", &self.kind)
            .field("max_percent", &self.max_percent)
            .finish_non_exhaustive()
    }
}

impl StressDriver {
    fn with_kind(kind: StressKind, agent: Arc<dyn RemoteCommandPort>, max_percent: f64, limits: &DriverLimits) -> Self {
        Self {
            kind,
            agent,
            max_percent,
            default_percent: limits.default_stress_percent.min(max_percent),
        }
    }

    /// CPU load (`cpu_percent`)
    pub fn cpu(agent: Arc<dyn RemoteCommandPort>, limits: &DriverLimits) -> Self {
        Self::with_kind(StressKind::Cpu, agent, limits.max_cpu_percent, limits)
    }

    /// Memory fill (`memory_percent`)
    pub fn memory(agent: Arc<dyn RemoteCommandPort>, limits: &DriverLimits) -> Self {
        Self::with_kind(StressKind::Memory, agent, limits.max_memory_percent, limits)
    }

    /// Disk fill (`disk_percent`)
    pub fn disk(agent: Arc<dyn RemoteCommandPort>, limits: &DriverLimits) -> Self {
        Self::with_kind(StressKind::Disk, agent, limits.max_disk_percent, limits)
    }

    /// Parameter carrying the intensity for this kind
    pub const fn intensity_param(&self) -> &'static str {
        match self.kind {
            StressKind::Cpu => "cpu_percent",
            StressKind::Memory => "memory_percent",
            StressKind::Disk => "disk_percent",
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn command(&self, parameters: &FailureParameters) -> StressCommand {
        let percent = whole(parameters.f64_or(self.intensity_param(), self.default_percent)).min(100);
        StressCommand {
            kind: self.kind,
            intensity_percent: percent as u8,
            duration_secs: whole(parameters.f64_or(DURATION_PARAM, DEFAULT_DURATION_SECS)).max(1),
        }
    }
}

#[async_trait]
impl FailureDriver for StressDriver {
    fn failure_type(&self) -> FailureType {
        match self.kind {
            StressKind::Cpu => FailureType::CpuStress,
            StressKind::Memory => FailureType::MemoryStress,
            StressKind::Disk => FailureType::DiskStress,
        }
    }

    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters {
        let mut clamped = parameters.clone();
        let intensity = clamped.clamp_f64(self.intensity_param(), 1.0, self.max_percent, self.default_percent);
        let duration = clamped.clamp_f64(DURATION_PARAM, 1.0, MAX_DURATION_SECS, DEFAULT_DURATION_SECS);
        if intensity || duration {
            info!(kind = ?self.kind, "Parameters clamped to driver limits");
        }
        clamped
    }

    #[instrument(skip_all, fields(kind = ?self.kind, targets = targets.len()))]
    async fn apply(
        &self,
        targets: &[ResourceId],
        parameters: &FailureParameters,
    ) -> Result<InjectionHandle, ApplicationError> {
        let command = self.command(parameters);
        let agent = &self.agent;
        let command_ref = &command;

        let started = apply_each(
            targets,
            move |resource| async move { agent.run_command(&resource, command_ref).await },
            move |resource, command_id: String| async move {
                agent.stop_command(&resource, &command_id).await
            },
        )
        .await?;

        info!(
            hosts = started.len(),
            intensity_percent = command.intensity_percent,
            duration_secs = command.duration_secs,
            "Stress started"
        );
        let state = StressState {
            commands: started
                .into_iter()
                .map(|(resource, command_id)| RunningCommand { resource, command_id })
                .collect(),
        };

        Ok(InjectionHandle::new(
            self.failure_type(),
            targets.to_vec(),
            parameters.clone(),
            encode_state(&state)?,
        ))
    }

    #[instrument(skip_all, fields(kind = ?self.kind, handle_id = %handle.id))]
    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError> {
        let state: StressState = decode_state(handle)?;
        let mut failures = Vec::new();

        for running in &state.commands {
            if let Err(e) = self.agent.stop_command(&running.resource, &running.command_id).await {
                warn!(resource = %running.resource, command_id = %running.command_id, error = %e, "Stop failed");
                failures.push(format!("{}: {e}", running.resource));
            }
        }

        removal_result(state.commands.len(), failures)
    }
}
