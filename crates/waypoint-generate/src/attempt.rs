//! A single call to the generation service.

use waypoint_core::AttemptStatus;

use crate::transport::TransportError;

/// Text and status accumulated by one attempt.
///
/// Text from a failed attempt is discarded by the pipeline; only the winning
/// attempt's text becomes the report.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    number: u32,
    status: AttemptStatus,
    accumulated: String,
    error: Option<TransportError>,
}

impl GenerationAttempt {
    /// Start attempt `number` (1-based).
    pub fn new(number: u32) -> Self {
        Self {
            number,
            status: AttemptStatus::Pending,
            accumulated: String::new(),
            error: None,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// The failure that ended the attempt, if any.
    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    /// Append a chunk. Returns true for the first chunk of the attempt.
    pub fn push(&mut self, chunk: &str) -> bool {
        let first = self.status == AttemptStatus::Pending;
        self.status = AttemptStatus::Streaming;
        self.accumulated.push_str(chunk);
        first
    }

    /// Close the attempt once the stream has ended.
    ///
    /// Whitespace-only output is a transient failure.
    pub fn finish(&mut self) -> Result<(), TransportError> {
        if self.accumulated.trim().is_empty() {
            let err = TransportError::transient("service returned an empty response");
            self.fail(err.clone());
            return Err(err);
        }
        self.status = AttemptStatus::Succeeded;
        Ok(())
    }

    /// Mark the attempt failed.
    pub fn fail(&mut self, error: TransportError) {
        self.status = AttemptStatus::Failed;
        self.error = Some(error);
    }

    /// Consume the attempt, yielding its text.
    pub fn into_text(self) -> String {
        self.accumulated
    }
}
