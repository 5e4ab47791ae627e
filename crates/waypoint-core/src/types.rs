//! Common types used across Waypoint.

use serde::{Deserialize, Serialize};

/// Derived status of a step for a given session.
///
/// `Locked` and `Unlocked` are computed from the access gates each time;
/// only `Completed` membership and the `Current` pointer are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Tier or prerequisite gate not satisfied.
    Locked,
    /// Reachable but not selected.
    Unlocked,
    /// The step the user is currently working on.
    Current,
    /// The step has been completed.
    Completed,
}

impl StepStatus {
    /// Returns true if the user may navigate to the step.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, StepStatus::Locked)
    }
}

/// Aggregate metrics derived from completed steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregateScores {
    /// Rounded sum of `opportunity * multiplier + module + complexity`.
    pub total: i64,

    /// Raw sum of opportunity weights.
    pub opportunities: f64,

    /// Raw sum of module weights.
    pub modules: f64,

    /// Raw sum of complexity weights.
    pub complexity: f64,

    /// Rounded multiplier-scaled opportunity subtotal shown to the user.
    ///
    /// Rounded independently of `total`, so the displayed parts need not sum
    /// to the displayed total.
    pub scaled_opportunities: i64,
}

/// Status of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Call issued, no bytes yet.
    Pending,
    /// Chunks are arriving.
    Streaming,
    /// Stream finished with usable output.
    Succeeded,
    /// Transport or service failure.
    Failed,
}

impl AttemptStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Succeeded | AttemptStatus::Failed)
    }
}
