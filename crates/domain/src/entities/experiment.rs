//! Experiment - Immutable definition of a chaos experiment
//!
//! An experiment is created once from a validated [`ExperimentDefinition`]
//! and never changes afterwards. Changing anything means registering a new
//! experiment with a new id.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::failure_parameters::{DURATION_PARAM, FailureParameters};
use super::safety::SafetyChecks;
use super::success_criterion::SuccessCriterion;
use crate::errors::DomainError;
use crate::value_objects::{ExperimentId, FailureType, ResourceId};

/// Longest accepted failure window (one day)
pub const MAX_DURATION_SECS: u64 = 86_400;

/// Manual steps for an operator when automatic removal fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPlan {
    /// Human-readable steps, in order
    #[serde(default)]
    pub steps: Vec<String>,
}

impl RollbackPlan {
    /// Steps joined for inclusion in an error message
    pub fn summary(&self) -> Option<String> {
        (!self.steps.is_empty()).then(|| self.steps.join("; "))
    }
}

/// Unvalidated experiment input, as submitted by an operator
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExperimentDefinition {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub failure_type: FailureType,

    #[validate(length(min = 1))]
    pub target_resources: Vec<String>,

    #[serde(default)]
    pub failure_parameters: FailureParameters,

    /// How long the failure stays active
    #[validate(range(min = 1, max = 86_400))]
    pub duration_secs: u64,

    #[validate(length(min = 1))]
    pub hypothesis: String,

    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,

    #[serde(default)]
    pub rollback_plan: RollbackPlan,

    #[serde(default)]
    #[validate(nested)]
    pub safety_checks: SafetyChecks,
}

/// A registered, immutable experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub description: Option<String>,
    pub failure_type: FailureType,
    /// Deduplicated and ordered
    pub target_resources: BTreeSet<ResourceId>,
    pub failure_parameters: FailureParameters,
    pub duration_secs: u64,
    pub hypothesis: String,
    pub success_criteria: Vec<SuccessCriterion>,
    pub rollback_plan: RollbackPlan,
    pub safety_checks: SafetyChecks,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Validate a definition and build the experiment from it
    pub fn from_definition(definition: ExperimentDefinition) -> Result<Self, DomainError> {
        definition
            .validate()
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;

        if definition.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "name must not be blank".to_string(),
            ));
        }
        if definition.hypothesis.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "hypothesis must not be blank".to_string(),
            ));
        }

        if let Some(SuccessCriterion::Malformed { kind, reason, .. }) = definition
            .success_criteria
            .iter()
            .find(|c| matches!(c, SuccessCriterion::Malformed { .. }))
        {
            return Err(DomainError::ValidationError(format!(
                "success criterion '{kind}' is malformed: {reason}"
            )));
        }

        let target_resources = definition
            .target_resources
            .into_iter()
            .map(ResourceId::new)
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            id: ExperimentId::new(),
            name: definition.name.trim().to_string(),
            description: definition.description,
            failure_type: definition.failure_type,
            target_resources,
            failure_parameters: definition.failure_parameters,
            duration_secs: definition.duration_secs,
            hypothesis: definition.hypothesis,
            success_criteria: definition.success_criteria,
            rollback_plan: definition.rollback_plan,
            safety_checks: definition.safety_checks,
            created_at: Utc::now(),
        })
    }

    /// How long the failure stays active
    pub const fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Targets in their canonical order
    pub fn targets(&self) -> Vec<ResourceId> {
        self.target_resources.iter().cloned().collect()
    }

    /// Parameters handed to the driver, with the failure window filled in
    ///
    /// An explicit `duration_secs` parameter wins over the experiment duration.
    pub fn driver_parameters(&self) -> FailureParameters {
        let mut parameters = self.failure_parameters.clone();
        if parameters.get(DURATION_PARAM).is_none() {
            parameters.insert(DURATION_PARAM, self.duration_secs);
        }
        parameters
    }
}
