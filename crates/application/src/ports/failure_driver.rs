//! Failure driver port
//!
//! One driver per [`FailureType`]. Drivers apply a failure to a set of
//! targets and return a handle carrying everything needed to undo it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// A reversible failure implementation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FailureDriver: Send + Sync {
    /// The failure type this driver implements
    fn failure_type(&self) -> FailureType;

    /// Clamp parameters to this driver's safe maxima, filling defaults
    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters;

    /// Apply the failure; on error nothing may be left applied
    async fn apply(
        &self,
        targets: &[ResourceId],
        parameters: &FailureParameters,
    ) -> Result<InjectionHandle, ApplicationError>;

    /// Undo a previously applied failure
    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError>;
}

/// Drivers selected by failure type
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<FailureType, Arc<dyn FailureDriver>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.drivers.keys().map(FailureType::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("DriverRegistry").field("drivers", &kinds).finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own failure type, replacing any previous one
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn FailureDriver>) -> Self {
        self.register(driver);
        self
    }

    pub fn register(&mut self, driver: Arc<dyn FailureDriver>) {
        self.drivers.insert(driver.failure_type(), driver);
    }

    pub fn get(&self, failure_type: FailureType) -> Result<Arc<dyn FailureDriver>, ApplicationError> {
        self.drivers.get(&failure_type).cloned().ok_or_else(|| {
            ApplicationError::Configuration(format!("No driver registered for {failure_type}"))
        })
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
