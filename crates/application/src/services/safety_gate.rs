//! Safety Gate - Preconditions before injection and guardrails during it

use std::sync::Arc;
use std::time::Duration;

use domain::{ChaosError, Experiment, MetricSample, ResourceId, SafetyChecks, SafetyViolation};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::InfrastructureClient;

/// What the gate verified before letting an injection through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionReport {
    pub total_eligible_resources: usize,
    pub target_count: usize,
    /// Effective ceiling after applying the orchestrator-wide limit
    pub max_blast_radius: f64,
    pub max_targets: usize,
    /// Fraction of the eligible pool being targeted
    pub blast_radius: f64,
}

/// Decides whether an experiment may inject and whether it must stop
pub struct SafetyGate {
    infrastructure: Arc<dyn InfrastructureClient>,
    /// Orchestrator-wide ceiling; experiments can only go lower
    blast_radius_ceiling: f64,
    call_timeout: Duration,
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field("blast_radius_ceiling", &self.blast_radius_ceiling)
            .finish_non_exhaustive()
    }
}

impl SafetyGate {
    pub fn new(
        infrastructure: Arc<dyn InfrastructureClient>,
        blast_radius_ceiling: f64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            infrastructure,
            blast_radius_ceiling: blast_radius_ceiling.clamp(0.0, 1.0),
            call_timeout,
        }
    }

    /// Verify blast radius and target health
    ///
    /// Every failure is a [`ChaosError::PreconditionFailed`]; no driver may
    /// be invoked after an error from here.
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id))]
    #[allow(clippy::cast_precision_loss)]
    pub async fn check_preconditions(
        &self,
        experiment: &Experiment,
    ) -> Result<PreconditionReport, ApplicationError> {
        let targets = experiment.targets();
        let ceiling = experiment
            .safety_checks
            .max_blast_radius
            .min(self.blast_radius_ceiling);

        let total = self
            .bounded(self.infrastructure.count_eligible_resources(&targets), "count eligible resources")
            .await?;
        let max_targets = SafetyChecks::max_targets(ceiling, total);

        if total == 0 || targets.len() > max_targets {
            warn!(targets = targets.len(), total, max_targets, "Blast radius exceeded");
            return Err(ChaosError::PreconditionFailed(format!(
                "{} target(s) exceed the blast radius of {:.0}% over {} eligible resource(s) (max {})",
                targets.len(),
                ceiling * 100.0,
                total,
                max_targets
            ))
            .into());
        }

        let health = self
            .bounded(self.infrastructure.describe_health(&targets), "describe target health")
            .await?;
        let unhealthy: Vec<&ResourceId> = targets
            .iter()
            .filter(|t| !health.iter().any(|h| &h.resource == *t && h.healthy))
            .collect();

        if !unhealthy.is_empty() {
            let names: Vec<String> = unhealthy.iter().map(ToString::to_string).collect();
            warn!(unhealthy = ?names, "Targets not healthy before injection");
            return Err(ChaosError::PreconditionFailed(format!(
                "targets not healthy: {}",
                names.join(", ")
            ))
            .into());
        }

        debug!(total, max_targets, "Preconditions satisfied");
        Ok(PreconditionReport {
            total_eligible_resources: total,
            target_count: targets.len(),
            max_blast_radius: ceiling,
            max_targets,
            blast_radius: targets.len() as f64 / total as f64,
        })
    }

    /// Evaluate the experiment's guardrails against one sample
    pub fn check_sample(&self, checks: &SafetyChecks, sample: &MetricSample) -> Option<SafetyViolation> {
        let violation = checks.first_breach(sample)?;
        warn!(
            guardrail = %violation.guardrail,
            observed = violation.observed,
            threshold = violation.threshold,
            sequence = sample.sequence,
            "Guardrail breached"
        );
        Some(violation)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ApplicationError>>,
        what: &str,
    ) -> Result<T, ApplicationError> {
        match timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChaosError::PreconditionFailed(format!("could not {what}: {e}")).into()),
            Err(_) => Err(ChaosError::PreconditionFailed(format!(
                "could not {what}: timed out after {}s",
                self.call_timeout.as_secs()
            ))
            .into()),
        }
    }
}
