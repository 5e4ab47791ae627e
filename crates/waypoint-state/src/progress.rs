//! Persisted progress document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_core::{Result, StepId, WaypointError};

/// The JSON document written to the external store after every mutation.
///
/// Serialized as `{ "completedSteps": [..], "currentStep": n, "timestamp": ".." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProgress {
    /// Completed step ids, ascending.
    pub completed_steps: Vec<StepId>,

    /// The step the user was on.
    pub current_step: StepId,

    /// When the document was written.
    pub timestamp: DateTime<Utc>,
}

impl PersistedProgress {
    /// Capture a snapshot stamped with the current time.
    pub fn capture(completed: &BTreeSet<StepId>, current: StepId) -> Self {
        Self {
            completed_steps: completed.iter().copied().collect(),
            current_step: current,
            timestamp: Utc::now(),
        }
    }

    /// Completed ids as a set (duplicates collapse).
    pub fn completed_set(&self) -> BTreeSet<StepId> {
        self.completed_steps.iter().copied().collect()
    }

    /// Encode for the store.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a stored value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| WaypointError::StateError {
            message: format!("Malformed progress document: {}", e),
        })
    }
}
