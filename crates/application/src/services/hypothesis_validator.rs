//! Hypothesis Validator - Evaluates success criteria against a finished run

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    CriterionOutcome, CriterionStatus, Execution, Experiment, Phase, SuccessCriterion,
    ValidationResult, mean,
};
use serde_json::Value;
use tracing::{debug, warn};

/// A named predicate referenced by `custom` criteria
pub trait CustomPredicate: Send + Sync {
    /// `Ok(true)` passes, `Ok(false)` fails, `Err` makes the verdict inconclusive
    fn evaluate(&self, execution: &Execution) -> Result<bool, String>;
}

impl<F> CustomPredicate for F
where
    F: Fn(&Execution) -> Result<bool, String> + Send + Sync,
{
    fn evaluate(&self, execution: &Execution) -> Result<bool, String> {
        self(execution)
    }
}

/// Evaluates every success criterion of an experiment
#[derive(Clone, Default)]
pub struct HypothesisValidator {
    predicates: HashMap<String, Arc<dyn CustomPredicate>>,
}

impl std::fmt::Debug for HypothesisValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.predicates.keys().collect();
        ids.sort_unstable();
        f.debug_struct("HypothesisValidator")
            .field("predicates", &ids)
            .finish()
    }
}

impl HypothesisValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under `id`, replacing any previous one
    #[must_use]
    pub fn with_predicate(mut self, id: impl Into<String>, predicate: Arc<dyn CustomPredicate>) -> Self {
        self.predicates.insert(id.into(), predicate);
        self
    }

    /// Evaluate all criteria using the recorded phase results and samples
    pub fn validate(&self, experiment: &Experiment, execution: &Execution) -> ValidationResult {
        let outcomes = experiment
            .success_criteria
            .iter()
            .map(|criterion| self.evaluate(criterion, execution))
            .collect();

        let confidence =
            mean(execution.metrics_collected.iter().map(domain::MetricSample::completeness)).unwrap_or(0.0);

        let result = ValidationResult::from_outcomes(outcomes, confidence);
        for warning in &result.warnings {
            warn!(execution_id = %execution.id, warning = %warning, "Criterion not evaluated");
        }
        debug!(
            execution_id = %execution.id,
            validated = ?result.hypothesis_validated,
            confidence = result.confidence,
            "Hypothesis evaluated"
        );
        result
    }

    fn evaluate(&self, criterion: &SuccessCriterion, execution: &Execution) -> CriterionOutcome {
        let (status, detail) = match criterion {
            SuccessCriterion::RecoveryTime { max_seconds } => recovery_time(*max_seconds, execution),
            SuccessCriterion::Availability { min_percentage } => availability(*min_percentage, execution),
            SuccessCriterion::Custom { predicate_id } => match self.predicates.get(predicate_id) {
                None => (
                    CriterionStatus::Warning,
                    format!("predicate '{predicate_id}' is not registered"),
                ),
                Some(predicate) => match predicate.evaluate(execution) {
                    Ok(true) => (CriterionStatus::Passed, "predicate held".to_string()),
                    Ok(false) => (CriterionStatus::Failed, "predicate did not hold".to_string()),
                    Err(e) => (CriterionStatus::Error, format!("predicate failed: {e}")),
                },
            },
            SuccessCriterion::Unknown { kind, .. } => (
                CriterionStatus::Warning,
                format!("unknown criterion type '{kind}'"),
            ),
            SuccessCriterion::Malformed { reason, .. } => (CriterionStatus::Error, reason.clone()),
        };
        CriterionOutcome::new(criterion.clone(), status, detail)
    }
}

#[allow(clippy::cast_precision_loss)]
fn recovery_time(max_seconds: u64, execution: &Execution) -> (CriterionStatus, String) {
    let Some(recovery) = execution.phase_results.get(&Phase::Recovery) else {
        return (CriterionStatus::Error, "no recovery result recorded".to_string());
    };
    let recovered = recovery.get("recovery_successful").and_then(Value::as_bool);
    let seconds = recovery.get("recovery_duration_secs").and_then(Value::as_f64);

    match (recovered, seconds) {
        (Some(false), _) => (
            CriterionStatus::Failed,
            "targets did not recover".to_string(),
        ),
        (Some(true), Some(secs)) if secs <= max_seconds as f64 => (
            CriterionStatus::Passed,
            format!("recovered in {secs}s (limit {max_seconds}s)"),
        ),
        (Some(true), Some(secs)) => (
            CriterionStatus::Failed,
            format!("recovered in {secs}s, over the {max_seconds}s limit"),
        ),
        _ => (CriterionStatus::Error, "recovery result is incomplete".to_string()),
    }
}

fn availability(min_percentage: f64, execution: &Execution) -> (CriterionStatus, String) {
    match mean(execution.metrics_collected.iter().filter_map(|s| s.availability)) {
        None => (
            CriterionStatus::Warning,
            "no availability samples collected".to_string(),
        ),
        Some(observed) if observed >= min_percentage => (
            CriterionStatus::Passed,
            format!("mean availability {observed:.3}% >= {min_percentage}%"),
        ),
        Some(observed) => (
            CriterionStatus::Failed,
            format!("mean availability {observed:.3}% < {min_percentage}%"),
        ),
    }
}
