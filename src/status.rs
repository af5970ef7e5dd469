//! Status tracker shared by the dump and restore workflows
//!
//! Long-running operations record their progress as an append-only list of
//! conditions plus a coarse phase. The tracker is a small state machine: a
//! transition appends exactly one condition, and once an attempt reaches a
//! terminal phase no further transition is accepted.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Coarse phase of a dump or restore operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OperationPhase {
    Running,
    Completed,
    Failed,
}

impl OperationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationPhase::Completed | OperationPhase::Failed)
    }
}

/// One step's outcome within a larger operation. Appended, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationCondition {
    pub ready: bool,

    /// Storage locator of the published dump, set by the upload step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub reason: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub last_transition_time: DateTime<Utc>,
}

impl OperationCondition {
    /// Successful step
    pub fn ok(reason: &str) -> Self {
        Self {
            ready: true,
            location: None,
            reason: reason.to_string(),
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Step started but not yet ready
    pub fn pending(reason: &str) -> Self {
        Self {
            ready: false,
            location: None,
            reason: reason.to_string(),
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Failed step with the failure detail as message
    pub fn failed(reason: &str, message: impl Into<String>) -> Self {
        Self {
            ready: false,
            location: None,
            reason: reason.to_string(),
            message: Some(message.into()),
            last_transition_time: Utc::now(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// The persisted phase/condition pair shared by dump and restore statuses
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<OperationPhase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperationCondition>,
}

/// Tracks one operation attempt on top of any previously persisted history.
///
/// Conditions from earlier attempts are carried forward (the list is
/// append-only across attempts); the terminal-phase guard applies to the
/// current attempt only, so a resource whose last attempt completed can
/// still begin a new one.
pub struct StatusTracker {
    status: OperationStatus,
    attempt: Option<OperationPhase>,
}

impl StatusTracker {
    pub fn resume(prior: Option<&OperationStatus>) -> Self {
        Self {
            status: prior.cloned().unwrap_or_default(),
            attempt: None,
        }
    }

    /// Move the attempt to `phase`, appending exactly one condition.
    ///
    /// Returns the updated status for persistence. Rejects any transition
    /// once the attempt has reached Completed or Failed.
    pub fn transition(
        &mut self,
        phase: OperationPhase,
        condition: OperationCondition,
    ) -> Result<&OperationStatus> {
        if let Some(from) = self.attempt {
            if from.is_terminal() {
                return Err(Error::InvalidTransition { from, to: phase });
            }
        }
        self.attempt = Some(phase);
        self.status.phase = Some(phase);
        self.status.conditions.push(condition);
        Ok(&self.status)
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    pub fn phase(&self) -> Option<OperationPhase> {
        self.attempt
    }
}
