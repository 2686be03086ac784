//! Retrying driver - Backoff around transient apply failures
//!
//! Only `apply` is retried. A failed removal may have partially succeeded,
//! so it is reported once and left to an operator.

use std::sync::Arc;

use application::ports::FailureDriver;
use application::ApplicationError;
use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
use tracing::warn;

use crate::retry::{RetryConfig, with_retry};

/// Decorator adding exponential backoff to a driver's `apply`
pub struct RetryingDriver {
    inner: Arc<dyn FailureDriver>,
    config: RetryConfig,
}

impl std::fmt::Debug for RetryingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingDriver")
            .field("failure_type", &self.inner.failure_type())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryingDriver {
    pub fn new(inner: Arc<dyn FailureDriver>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Attempts `apply` makes before giving up
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts()
    }
}

#[async_trait]
impl FailureDriver for RetryingDriver {
    fn failure_type(&self) -> FailureType {
        self.inner.failure_type()
    }

    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters {
        self.inner.clamp_parameters(parameters)
    }

    async fn apply(
        &self,
        targets: &[ResourceId],
        parameters: &FailureParameters,
    ) -> Result<InjectionHandle, ApplicationError> {
        let outcome = with_retry(&self.config, || self.inner.apply(targets, parameters)).await;
        if outcome.attempts > 1 {
            warn!(
                failure_type = %self.inner.failure_type(),
                attempts = outcome.attempts,
                succeeded = outcome.is_ok(),
                "Driver apply needed retries"
            );
        }
        outcome.into_result()
    }

    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError> {
        self.inner.remove(handle).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::Value;

    use super::*;
    use crate::testing::MockDriver;

    fn config() -> RetryConfig {
        RetryConfig::new(100, 1_000, 2.0, 3).without_jitter()
    }

    fn targets() -> Vec<ResourceId> {
        vec![ResourceId::new("svc-a").unwrap()]
    }

    #[tokio::test(start_paused = true)]
    async fn transient_apply_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let mut inner = MockDriver::new();
        inner.expect_failure_type().return_const(FailureType::NetworkLatency);
        inner.expect_apply().times(3).returning(move |targets, params| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApplicationError::ExternalService("503".into()))
            } else {
                Ok(InjectionHandle::new(
                    FailureType::NetworkLatency,
                    targets.to_vec(),
                    params.clone(),
                    Value::Null,
                ))
            }
        });

        let driver = RetryingDriver::new(Arc::new(inner), config());
        let handle = driver.apply(&targets(), &FailureParameters::new()).await.unwrap();
        assert_eq!(handle.targets, targets());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_apply_errors_fail_fast() {
        let mut inner = MockDriver::new();
        inner.expect_failure_type().return_const(FailureType::NetworkLatency);
        inner
            .expect_apply()
            .times(1)
            .returning(|_, _| Err(ApplicationError::InvalidOperation("bad rule".into())));

        let driver = RetryingDriver::new(Arc::new(inner), config());
        let err = driver.apply(&targets(), &FailureParameters::new()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidOperation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_the_last_error() {
        let mut inner = MockDriver::new();
        inner.expect_failure_type().return_const(FailureType::NetworkLatency);
        inner
            .expect_apply()
            .times(4)
            .returning(|_, _| Err(ApplicationError::ExternalService("503".into())));

        let driver = RetryingDriver::new(Arc::new(inner), config());
        assert_eq!(driver.max_attempts(), 4);
        let err = driver.apply(&targets(), &FailureParameters::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn removal_is_attempted_once() {
        let mut inner = MockDriver::new();
        inner
            .expect_remove()
            .times(1)
            .returning(|_| Err(ApplicationError::ExternalService("503".into())));

        let driver = RetryingDriver::new(Arc::new(inner), config());
        let handle = InjectionHandle::new(
            FailureType::NetworkLatency,
            targets(),
            FailureParameters::new(),
            Value::Null,
        );
        assert!(driver.remove(&handle).await.is_err());
    }
}
