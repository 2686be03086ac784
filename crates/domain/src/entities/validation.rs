//! Validation results - Per-criterion outcomes and the overall verdict

use serde::{Deserialize, Serialize};

use super::success_criterion::SuccessCriterion;

/// Status of one evaluated criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Passed,
    Failed,
    /// Could not be evaluated but does not block the verdict
    Warning,
    /// Evaluation broke; the verdict becomes inconclusive
    Error,
}

/// Result of evaluating one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionOutcome {
    pub criterion: SuccessCriterion,
    pub status: CriterionStatus,
    pub detail: String,
}

impl CriterionOutcome {
    pub fn new(criterion: SuccessCriterion, status: CriterionStatus, detail: impl Into<String>) -> Self {
        Self {
            criterion,
            status,
            detail: detail.into(),
        }
    }
}

/// Verdict of the validation phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub outcomes: Vec<CriterionOutcome>,
    /// `None` when inconclusive
    pub hypothesis_validated: Option<bool>,
    /// Mean completeness of the observed samples, 0.0 - 1.0
    pub confidence: f64,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Fold per-criterion outcomes into a verdict
    ///
    /// Any error makes the result inconclusive; otherwise any failure fails
    /// it. Warnings never decide. Without a single decisive criterion the
    /// result is inconclusive too, never a silent pass.
    pub fn from_outcomes(outcomes: Vec<CriterionOutcome>, confidence: f64) -> Self {
        let warnings = outcomes
            .iter()
            .filter(|o| o.status == CriterionStatus::Warning)
            .map(|o| format!("{}: {}", o.criterion.describe(), o.detail))
            .collect();

        let decisive = outcomes
            .iter()
            .any(|o| matches!(o.status, CriterionStatus::Passed | CriterionStatus::Failed));

        let hypothesis_validated = if outcomes.iter().any(|o| o.status == CriterionStatus::Error) {
            None
        } else if outcomes.iter().any(|o| o.status == CriterionStatus::Failed) {
            Some(false)
        } else if decisive {
            Some(true)
        } else {
            None
        };

        Self {
            outcomes,
            hypothesis_validated,
            confidence: confidence.clamp(0.0, 1.0),
            warnings,
        }
    }

    /// Outcomes with the given status
    pub fn with_status(&self, status: CriterionStatus) -> impl Iterator<Item = &CriterionOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }
}
