//! Transport seam between the pipeline and the generation service.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_core::GenerationRequest;

/// A stream of text chunks from one attempt.
///
/// The stream ends cleanly when the service has finished. An `Err` item ends
/// the attempt.
pub type ChunkStream = BoxStream<'static, Result<String, TransportError>>;

/// Whether retrying an attempt may help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The service rejected the request itself. Never retried.
    Validation,
    /// Network or service trouble. Retried up to the attempt cap.
    Transient,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Validation => write!(f, "validation"),
            FailureClass::Transient => write!(f, "transient"),
        }
    }
}

/// A classified failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{class} failure: {message}")]
pub struct TransportError {
    /// Retry classification.
    pub class: FailureClass,

    /// Service-supplied error code, when present.
    pub code: Option<String>,

    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// A failure worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            code: None,
            message: message.into(),
        }
    }

    /// A rejection of the request itself.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Validation,
            code: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status.
    ///
    /// 408, 429 and 5xx are transient; any other 4xx is a rejection.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let class = match status {
            408 | 429 => FailureClass::Transient,
            400..=499 => FailureClass::Validation,
            _ => FailureClass::Transient,
        };
        Self {
            class,
            code: Some(status.to_string()),
            message: message.into(),
        }
    }

    /// Classify a service error code such as `validation_error`.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let class = match code.as_str() {
            "validation_error" | "invalid_request" | "invalid_request_error" => {
                FailureClass::Validation
            }
            _ => FailureClass::Transient,
        };
        Self {
            class,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Returns true if the pipeline should retry.
    pub fn is_transient(&self) -> bool {
        self.class == FailureClass::Transient
    }
}

/// Opens a streamed generation call for one attempt.
///
/// Implementations must not retry internally; the pipeline owns the retry
/// budget. Dropping the returned stream should abort the underlying call.
#[async_trait]
pub trait GenerationTransport: Send + Sync + 'static {
    /// Issue the call and return its chunk stream.
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(TransportError::from_status(400, "").class, FailureClass::Validation);
        assert_eq!(TransportError::from_status(422, "").class, FailureClass::Validation);
        assert_eq!(TransportError::from_status(408, "").class, FailureClass::Transient);
        assert_eq!(TransportError::from_status(429, "").class, FailureClass::Transient);
        assert_eq!(TransportError::from_status(503, "").class, FailureClass::Transient);
    }

    #[test]
    fn test_code_classification() {
        let err = TransportError::from_code("validation_error", "name is required");
        assert!(!err.is_transient());
        assert_eq!(err.code.as_deref(), Some("validation_error"));

        assert!(TransportError::from_code("overloaded", "busy").is_transient());
    }

    #[test]
    fn test_display() {
        let err = TransportError::transient("connection reset");
        assert_eq!(err.to_string(), "transient failure: connection reset");
    }
}
