//! Metrics Collector - Baseline capture and the observation sample stream

use std::sync::Arc;
use std::time::Duration;

use domain::{BaselineMetrics, MetricSample, ResourceId};
use futures::Stream;
use futures::stream;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, warn};

use crate::ports::InfrastructureClient;

/// Smallest accepted sampling interval
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Samples target metrics at a fixed interval
pub struct MetricsCollector {
    infrastructure: Arc<dyn InfrastructureClient>,
    interval: Duration,
    call_timeout: Duration,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("interval", &self.interval)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl MetricsCollector {
    pub fn new(
        infrastructure: Arc<dyn InfrastructureClient>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            infrastructure,
            interval: interval.max(MIN_INTERVAL),
            call_timeout,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Take one sample; unreachable backends leave fields empty
    pub async fn sample(&self, sequence: u64, targets: &[ResourceId]) -> MetricSample {
        let mut sample = MetricSample::empty(sequence, targets.len());

        match timeout(self.call_timeout, self.infrastructure.list_metrics(targets)).await {
            Ok(Ok(reading)) => {
                sample.error_rate = reading.error_rate;
                sample.availability = reading.availability;
                sample.latency_p99_ms = reading.latency_p99_ms;
                sample.healthy_replicas = reading.healthy_replicas;
                sample.custom = reading.custom;
            },
            Ok(Err(e)) => warn!(sequence, error = %e, "Metrics read failed"),
            Err(_) => warn!(sequence, "Metrics read timed out"),
        }

        match timeout(self.call_timeout, self.infrastructure.describe_health(targets)).await {
            Ok(Ok(health)) => {
                sample.healthy_targets = Some(health.iter().filter(|h| h.healthy).count());
            },
            Ok(Err(e)) => warn!(sequence, error = %e, "Health read failed"),
            Err(_) => warn!(sequence, "Health read timed out"),
        }

        debug!(sequence, completeness = sample.completeness(), "Metric sample taken");
        sample
    }

    /// Average samples over `window`, one per interval, starting now
    pub async fn baseline(&self, targets: &[ResourceId], window: Duration) -> BaselineMetrics {
        let count = (window.as_millis() / self.interval.as_millis()).max(1);
        let count = u64::try_from(count).unwrap_or(u64::MAX);

        let mut samples = Vec::new();
        for sequence in 1..=count {
            if sequence > 1 {
                sleep(self.interval).await;
            }
            samples.push(self.sample(sequence, targets).await);
        }

        BaselineMetrics::from_samples(&samples, window.as_secs())
    }

    /// Finite stream of samples, one per interval, ending at `duration`
    ///
    /// The last sample is taken exactly at `duration` even when it is not a
    /// multiple of the interval. Each call starts a fresh stream.
    pub fn stream(
        &self,
        targets: Vec<ResourceId>,
        duration: Duration,
    ) -> impl Stream<Item = MetricSample> + Send + '_ {
        let start = Instant::now();
        let targets: Arc<[ResourceId]> = targets.into();

        stream::unfold((1u64, Duration::ZERO), move |(sequence, reached)| {
            let targets = Arc::clone(&targets);
            async move {
                if reached >= duration {
                    return None;
                }
                let steps = u32::try_from(sequence).unwrap_or(u32::MAX);
                let offset = self.interval.saturating_mul(steps).min(duration);
                sleep_until(start + offset).await;

                let sample = self.sample(sequence, &targets).await;
                Some((sample, (sequence + 1, offset)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplicationError;
    use crate::ports::{MetricReading, MockInfrastructureClient, ResourceHealth};
    use futures::StreamExt;

    fn targets() -> Vec<ResourceId> {
        vec![ResourceId::new("web-1").unwrap(), ResourceId::new("web-2").unwrap()]
    }

    fn healthy_infra() -> MockInfrastructureClient {
        let mut infra = MockInfrastructureClient::new();
        infra.expect_list_metrics().returning(|_| {
            Ok(MetricReading {
                error_rate: Some(0.5),
                availability: Some(99.9),
                latency_p99_ms: Some(120.0),
                healthy_replicas: Some(3),
                ..MetricReading::default()
            })
        });
        infra.expect_describe_health().returning(|resources| {
            Ok(resources.iter().cloned().map(ResourceHealth::healthy).collect())
        });
        infra
    }

    #[tokio::test(start_paused = true)]
    async fn stream_is_bounded_by_duration() {
        let collector =
            MetricsCollector::new(Arc::new(healthy_infra()), Duration::from_secs(30), Duration::from_secs(5));

        let start = Instant::now();
        let samples: Vec<_> = collector.stream(targets(), Duration::from_secs(100)).collect().await;

        // 30, 60, 90 and the final sample at 100
        assert_eq!(samples.len(), 4);
        assert_eq!(samples.last().unwrap().sequence, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(100));
        assert_eq!(samples[0].healthy_targets, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_is_restartable() {
        let collector =
            MetricsCollector::new(Arc::new(healthy_infra()), Duration::from_secs(30), Duration::from_secs(5));

        let first = collector.stream(targets(), Duration::from_secs(60)).count().await;
        let second = collector.stream(targets(), Duration::from_secs(60)).count().await;
        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reads_leave_fields_empty() {
        let mut infra = MockInfrastructureClient::new();
        infra
            .expect_list_metrics()
            .returning(|_| Err(ApplicationError::ExternalService("metrics down".into())));
        infra
            .expect_describe_health()
            .returning(|_| Err(ApplicationError::ExternalService("health down".into())));
        let collector = MetricsCollector::new(Arc::new(infra), Duration::from_secs(30), Duration::from_secs(5));

        let sample = collector.sample(1, &targets()).await;
        assert_eq!(sample.error_rate, None);
        assert_eq!(sample.healthy_targets, None);
        assert!(sample.completeness().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_takes_one_sample_per_interval() {
        let collector =
            MetricsCollector::new(Arc::new(healthy_infra()), Duration::from_secs(30), Duration::from_secs(5));

        let baseline = collector.baseline(&targets(), Duration::from_secs(90)).await;
        assert_eq!(baseline.samples, 3);
        let availability = baseline.availability.unwrap();
        assert!((availability - 99.9).abs() < 1e-9, "{availability}");
        assert_eq!(baseline.healthy_targets, Some(2));
    }
}
