//! Success criteria - Declarative rules checked during validation
//!
//! Criteria are written as `{"type": ..., "params": {...}}`. Types the
//! orchestrator does not know are preserved as [`SuccessCriterion::Unknown`]
//! so they surface as warnings instead of failing the whole definition.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A single success criterion of a hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCriterion", into = "RawCriterion")]
pub enum SuccessCriterion {
    /// Targets must recover within `max_seconds` (inclusive)
    RecoveryTime { max_seconds: u64 },
    /// Mean observed availability must be at least `min_percentage`
    Availability { min_percentage: f64 },
    /// A named predicate registered with the validator must hold
    Custom { predicate_id: String },
    /// A criterion type this orchestrator does not understand
    Unknown { kind: String, params: Value },
    /// A known type whose parameters could not be read
    Malformed {
        kind: String,
        params: Value,
        reason: String,
    },
}

impl SuccessCriterion {
    /// Recovery must finish within `max_seconds`
    pub const fn recovery_time(max_seconds: u64) -> Self {
        Self::RecoveryTime { max_seconds }
    }

    /// Mean availability must reach `min_percentage`
    pub const fn availability(min_percentage: f64) -> Self {
        Self::Availability { min_percentage }
    }

    /// Named custom predicate
    pub fn custom(predicate_id: impl Into<String>) -> Self {
        Self::Custom {
            predicate_id: predicate_id.into(),
        }
    }

    /// The criterion's `type` tag
    pub fn kind(&self) -> &str {
        match self {
            Self::RecoveryTime { .. } => "recovery_time",
            Self::Availability { .. } => "availability",
            Self::Custom { .. } => "custom",
            Self::Unknown { kind, .. } | Self::Malformed { kind, .. } => kind,
        }
    }

    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::RecoveryTime { max_seconds } => format!("recovery_time <= {max_seconds}s"),
            Self::Availability { min_percentage } => format!("availability >= {min_percentage}%"),
            Self::Custom { predicate_id } => format!("custom:{predicate_id}"),
            Self::Unknown { kind, .. } => format!("unknown:{kind}"),
            Self::Malformed { kind, reason, .. } => format!("malformed:{kind} ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCriterion {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Value,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn read_seconds(params: &Value) -> Option<u64> {
    let value = params.get("max_seconds")?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u64)
    })
}

impl From<RawCriterion> for SuccessCriterion {
    fn from(raw: RawCriterion) -> Self {
        let malformed = |reason: &str| Self::Malformed {
            kind: raw.kind.clone(),
            params: raw.params.clone(),
            reason: reason.to_string(),
        };

        match raw.kind.as_str() {
            "recovery_time" => read_seconds(&raw.params).map_or_else(
                || malformed("max_seconds must be a non-negative integer"),
                |max_seconds| Self::RecoveryTime { max_seconds },
            ),
            "availability" => match raw.params.get("min_percentage").and_then(Value::as_f64) {
                Some(p) if (0.0..=100.0).contains(&p) => Self::Availability { min_percentage: p },
                _ => malformed("min_percentage must be a number between 0 and 100"),
            },
            "custom" => match raw.params.get("predicate_id").and_then(Value::as_str) {
                Some(id) if !id.trim().is_empty() => Self::Custom {
                    predicate_id: id.trim().to_string(),
                },
                _ => malformed("predicate_id must be a non-empty string"),
            },
            _ => Self::Unknown {
                kind: raw.kind.clone(),
                params: raw.params.clone(),
            },
        }
    }
}

impl From<SuccessCriterion> for RawCriterion {
    fn from(criterion: SuccessCriterion) -> Self {
        match criterion {
            SuccessCriterion::RecoveryTime { max_seconds } => Self {
                kind: "recovery_time".to_string(),
                params: json!({ "max_seconds": max_seconds }),
            },
            SuccessCriterion::Availability { min_percentage } => Self {
                kind: "availability".to_string(),
                params: json!({ "min_percentage": min_percentage }),
            },
            SuccessCriterion::Custom { predicate_id } => Self {
                kind: "custom".to_string(),
                params: json!({ "predicate_id": predicate_id }),
            },
            SuccessCriterion::Unknown { kind, params }
            | SuccessCriterion::Malformed { kind, params, .. } => Self { kind, params },
        }
    }
}
