//! Safety checks - Blast radius ceiling and live guardrails

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::metric_sample::MetricSample;

/// Default fraction of eligible resources a single experiment may touch
pub const DEFAULT_MAX_BLAST_RADIUS: f64 = 0.10;

/// Tolerance for floating point blast radius comparisons
const BLAST_RADIUS_EPSILON: f64 = 1e-9;

const fn default_max_blast_radius() -> f64 {
    DEFAULT_MAX_BLAST_RADIUS
}

/// Safety constraints of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SafetyChecks {
    /// Maximum fraction (0.0 - 1.0) of eligible resources that may be targeted
    #[serde(default = "default_max_blast_radius")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_blast_radius: f64,

    /// Live thresholds evaluated against every metric sample
    #[serde(default)]
    pub guardrails: Vec<Guardrail>,
}

impl Default for SafetyChecks {
    fn default() -> Self {
        Self {
            max_blast_radius: DEFAULT_MAX_BLAST_RADIUS,
            guardrails: Vec::new(),
        }
    }
}

impl SafetyChecks {
    /// Largest number of targets allowed out of `total_eligible` resources
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn max_targets(ratio: f64, total_eligible: usize) -> usize {
        let allowed = ratio.clamp(0.0, 1.0) * total_eligible as f64 + BLAST_RADIUS_EPSILON;
        allowed.floor() as usize
    }

    /// Add a guardrail
    #[must_use]
    pub fn with_guardrail(mut self, guardrail: Guardrail) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    /// Evaluate every guardrail against a sample, returning the first breach
    pub fn first_breach(&self, sample: &MetricSample) -> Option<SafetyViolation> {
        self.guardrails.iter().find_map(|g| g.evaluate(sample))
    }
}

/// A live-metric threshold that forces an abort when breached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Guardrail {
    /// Error rate must stay at or below `max_percentage`
    MaxErrorRate { max_percentage: f64 },
    /// At least `min_count` replicas must stay healthy
    MinHealthyReplicas { min_count: usize },
    /// p99 latency must stay at or below `max_ms`
    MaxLatency { max_ms: f64 },
    /// Availability must stay at or above `min_percentage`
    MinAvailability { min_percentage: f64 },
}

impl Guardrail {
    /// Stable name used in violation reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MaxErrorRate { .. } => "max_error_rate",
            Self::MinHealthyReplicas { .. } => "min_healthy_replicas",
            Self::MaxLatency { .. } => "max_latency",
            Self::MinAvailability { .. } => "min_availability",
        }
    }

    /// Check a sample; a missing measurement cannot breach
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&self, sample: &MetricSample) -> Option<SafetyViolation> {
        let (observed, threshold, breached) = match *self {
            Self::MaxErrorRate { max_percentage } => {
                let observed = sample.error_rate?;
                (observed, max_percentage, observed > max_percentage)
            },
            Self::MinHealthyReplicas { min_count } => {
                let observed = sample.healthy_replicas?;
                (observed as f64, min_count as f64, observed < min_count)
            },
            Self::MaxLatency { max_ms } => {
                let observed = sample.latency_p99_ms?;
                (observed, max_ms, observed > max_ms)
            },
            Self::MinAvailability { min_percentage } => {
                let observed = sample.availability?;
                (observed, min_percentage, observed < min_percentage)
            },
        };

        breached.then(|| SafetyViolation {
            guardrail: self.name().to_string(),
            observed,
            threshold,
            sample_sequence: sample.sequence,
            detected_at: Utc::now(),
        })
    }
}

/// A guardrail breach observed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    /// Name of the breached guardrail
    pub guardrail: String,
    /// Observed value
    pub observed: f64,
    /// Configured threshold
    pub threshold: f64,
    /// Sequence number of the offending sample
    pub sample_sequence: u64,
    /// When the breach was detected
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} breached at sample {}: observed {} against threshold {}",
            self.guardrail, self.sample_sequence, self.observed, self.threshold
        )
    }
}
