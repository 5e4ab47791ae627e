//! Events observed by the caller of a generation.

use waypoint_core::{Report, WaypointError};

/// One event on a generation's stream.
///
/// Every generation ends with exactly one terminal event, `Succeeded` or
/// `Failed`, and nothing follows it.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// A call to the service is starting.
    Attempting { attempt: u32, max_attempts: u32 },

    /// Text received from the current attempt.
    Chunk { attempt: u32, text: String },

    /// The previous attempt failed transiently; `attempt` is the next one.
    Retrying {
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },

    /// Full text of the winning attempt.
    Succeeded(Report),

    /// Generation ended without a report.
    Failed(WaypointError),
}

impl GenerationEvent {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Succeeded(_) | GenerationEvent::Failed(_))
    }

    /// Short status line for progress displays, e.g. `Retrying (2/3)`.
    pub fn status_line(&self) -> Option<String> {
        match self {
            GenerationEvent::Attempting {
                attempt,
                max_attempts,
            } => Some(format!("Generating ({}/{})", attempt, max_attempts)),
            GenerationEvent::Retrying {
                attempt,
                max_attempts,
                ..
            } => Some(format!("Retrying ({}/{})", attempt, max_attempts)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_terminal_events() {
        let report = Report::new(Uuid::new_v4(), "done".into(), 1);
        assert!(GenerationEvent::Succeeded(report).is_terminal());
        assert!(GenerationEvent::Failed(WaypointError::Cancelled).is_terminal());
        assert!(!GenerationEvent::Chunk {
            attempt: 1,
            text: "x".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_status_line() {
        let event = GenerationEvent::Retrying {
            attempt: 2,
            max_attempts: 3,
            reason: "503".into(),
        };
        assert_eq!(event.status_line().as_deref(), Some("Retrying (2/3)"));
    }
}
