//! Metric samples - Health and performance readings taken during a run

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of optional measurements a sample can carry
const MEASUREMENT_FIELDS: u32 = 5;

/// One reading of the targets' health and performance
///
/// Any measurement may be missing when the metrics backend did not answer.
/// Missing fields lower validation confidence but never fail a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Position in the observation stream, starting at 1
    pub sequence: u64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Request error rate in percent
    #[serde(default)]
    pub error_rate: Option<f64>,
    /// Availability in percent
    #[serde(default)]
    pub availability: Option<f64>,
    /// 99th percentile latency in milliseconds
    #[serde(default)]
    pub latency_p99_ms: Option<f64>,
    /// Healthy replicas of the service behind the targets
    #[serde(default)]
    pub healthy_replicas: Option<usize>,
    /// Targets that currently report healthy
    #[serde(default)]
    pub healthy_targets: Option<usize>,
    /// Number of targets sampled
    pub total_targets: usize,
    /// Additional named measurements for custom predicates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, f64>,
}

impl MetricSample {
    /// Create an empty sample for `total_targets` targets
    pub fn empty(sequence: u64, total_targets: usize) -> Self {
        Self {
            sequence,
            timestamp: Utc::now(),
            error_rate: None,
            availability: None,
            latency_p99_ms: None,
            healthy_replicas: None,
            healthy_targets: None,
            total_targets,
            custom: BTreeMap::new(),
        }
    }

    /// Fraction of measurements present, from 0.0 to 1.0
    pub fn completeness(&self) -> f64 {
        let present = [
            self.error_rate.is_some(),
            self.availability.is_some(),
            self.latency_p99_ms.is_some(),
            self.healthy_replicas.is_some(),
            self.healthy_targets.is_some(),
        ]
        .into_iter()
        .filter(|p| *p)
        .count();

        f64::from(u32::try_from(present).unwrap_or(MEASUREMENT_FIELDS))
            / f64::from(MEASUREMENT_FIELDS)
    }

    /// Whether every target reported healthy
    pub fn all_targets_healthy(&self) -> bool {
        self.healthy_targets == Some(self.total_targets)
    }
}

/// Pre-injection snapshot used as the reference point of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    /// When the baseline finished
    pub captured_at: DateTime<Utc>,
    /// Length of the capture window in seconds
    pub window_secs: u64,
    /// Number of readings averaged
    pub samples: usize,
    /// Mean error rate in percent
    pub error_rate: Option<f64>,
    /// Mean availability in percent
    pub availability: Option<f64>,
    /// Mean p99 latency in milliseconds
    pub latency_p99_ms: Option<f64>,
    /// Healthy targets in the last reading
    pub healthy_targets: Option<usize>,
    /// Number of targets
    pub total_targets: usize,
}

impl BaselineMetrics {
    /// Average a series of samples into a baseline
    pub fn from_samples(samples: &[MetricSample], window_secs: u64) -> Self {
        Self {
            captured_at: Utc::now(),
            window_secs,
            samples: samples.len(),
            error_rate: mean(samples.iter().filter_map(|s| s.error_rate)),
            availability: mean(samples.iter().filter_map(|s| s.availability)),
            latency_p99_ms: mean(samples.iter().filter_map(|s| s.latency_p99_ms)),
            healthy_targets: samples.last().and_then(|s| s.healthy_targets),
            total_targets: samples.last().map_or(0, |s| s.total_targets),
        }
    }
}

/// Arithmetic mean, `None` for an empty series
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
