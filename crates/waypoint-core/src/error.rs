//! Error types for Waypoint.

use thiserror::Error;

use crate::step::StepId;

/// Main error type for Waypoint operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaypointError {
    /// Caller-supplied request or state is incomplete or inconsistent.
    ///
    /// `missing` enumerates every absent field; it may be empty when the
    /// generation service rejected the request with only a message.
    #[error("Validation failed: {message}")]
    Validation { missing: Vec<String>, message: String },

    /// A step id was not found in the catalog.
    #[error("Unknown step: {step_id}")]
    UnknownStep { step_id: StepId },

    /// A transition violated the tier or prerequisite gate.
    #[error("Step {step_id} is not accessible: {reason}")]
    InaccessibleStep { step_id: StepId, reason: String },

    /// Network or service failure during generation, after all attempts.
    #[error("Generation failed after {attempts} attempt(s): {message}")]
    TransientGeneration { attempts: u32, message: String },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The step catalog or tier table violates a load-time invariant.
    #[error("Invalid catalog: {message}")]
    InvalidCatalog { message: String },

    /// Progress store error.
    #[error("State store error: {message}")]
    StateError { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timed out.
    #[error("Operation timed out after {duration_ms}ms: {message}")]
    Timeout { duration_ms: u64, message: String },

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaypointError {
    /// Build a validation error from the list of missing fields.
    pub fn missing_fields(missing: Vec<String>) -> Self {
        let message = format!("missing required fields: {}", missing.join(", "));
        WaypointError::Validation { missing, message }
    }

    /// Build a validation error that carries only a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        WaypointError::Validation {
            missing: Vec::new(),
            message: message.into(),
        }
    }

    /// Returns true if a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WaypointError::TransientGeneration { .. } | WaypointError::Timeout { .. }
        )
    }

    /// Returns true if this is a caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaypointError::Cancelled)
    }

    /// Returns true if the caller's input was incomplete or rejected.
    pub fn is_validation(&self) -> bool {
        matches!(self, WaypointError::Validation { .. })
    }

    /// Returns the step ID if available.
    pub fn step_id(&self) -> Option<StepId> {
        match self {
            WaypointError::UnknownStep { step_id } => Some(*step_id),
            WaypointError::InaccessibleStep { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }
}

/// Convenience Result type for Waypoint operations.
pub type Result<T> = std::result::Result<T, WaypointError>;

impl From<serde_json::Error> for WaypointError {
    fn from(err: serde_json::Error) -> Self {
        WaypointError::SerializationError(err.to_string())
    }
}
