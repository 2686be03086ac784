//! Ledger events - Append-only log of what happened to an execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::Execution;
use crate::value_objects::{ExecutionId, ExecutionStatus, InjectionId, Phase};

/// What changed in a ledger write
///
/// Flattened into [`LedgerEvent`], so field keys must not collide with the
/// event's own `phase` and `status` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEventKind {
    Created,
    PhaseEntered {
        #[serde(rename = "entered_phase")]
        phase: Phase,
    },
    PhaseResultRecorded {
        #[serde(rename = "result_phase")]
        phase: Phase,
    },
    MetricSampled { sequence: u64 },
    InjectionRecorded { handle_id: InjectionId },
    RemovalRecorded { handle_id: InjectionId, success: bool },
    Finished {
        #[serde(rename = "final_status")]
        status: ExecutionStatus,
    },
}

impl LedgerEventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PhaseEntered { .. } => "phase_entered",
            Self::PhaseResultRecorded { .. } => "phase_result_recorded",
            Self::MetricSampled { .. } => "metric_sampled",
            Self::InjectionRecorded { .. } => "injection_recorded",
            Self::RemovalRecorded { .. } => "removal_recorded",
            Self::Finished { .. } => "finished",
        }
    }
}

/// One entry of an execution's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub execution_id: ExecutionId,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
    /// Phase of the execution after the change
    pub phase: Phase,
    /// Status of the execution after the change
    pub status: ExecutionStatus,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl LedgerEvent {
    /// Event describing `execution` right after the change
    pub fn new(execution: &Execution, kind: LedgerEventKind) -> Self {
        Self {
            execution_id: execution.id,
            kind,
            phase: execution.current_phase,
            status: execution.status,
            recorded_at: Utc::now(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
