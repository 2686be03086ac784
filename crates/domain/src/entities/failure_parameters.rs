//! Failure parameters - Free-form knobs handed to a failure driver

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter carrying how long a self-expiring failure stays active
pub const DURATION_PARAM: &str = "duration_secs";

/// Named parameters for a failure injection
///
/// Keys are driver specific (`latency_ms`, `cpu_percent`, `dependency`, ...).
/// Drivers clamp numeric values to their safe maxima before applying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureParameters(BTreeMap<String, Value>);

impl FailureParameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw parameter value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric parameter
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Non-negative integer parameter (accepts integral floats)
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let value = self.0.get(key)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as u64)
        })
    }

    /// String parameter
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Numeric parameter with a fallback
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    /// Clamp a numeric parameter into `[min, max]`
    ///
    /// Missing keys are set to `default` (itself clamped). Returns `true`
    /// when the stored value changed.
    pub fn clamp_f64(&mut self, key: &str, min: f64, max: f64, default: f64) -> bool {
        let current = self.get_f64(key);
        let wanted = current.filter(|v| v.is_finite()).unwrap_or(default);
        let clamped = wanted.clamp(min, max);

        if current == Some(clamped) {
            return false;
        }
        self.insert(key, clamped);
        true
    }

    /// Whether no parameters are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}
