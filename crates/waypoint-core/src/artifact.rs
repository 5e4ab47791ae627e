//! Report artifact.
//!
//! A Report is the durable output of a successful generation: the full text
//! of the winning attempt plus a digest for verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The generated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier for this report.
    pub id: Uuid,

    /// The request that produced it.
    pub request_id: Uuid,

    /// Full text of the successful attempt only.
    pub text: String,

    /// Attempt number that succeeded (1-based).
    pub attempts: u32,

    /// SHA-256 of `text`, hex-encoded.
    pub digest: String,

    /// Timestamp when generation completed.
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Create a report and compute its digest.
    pub fn new(request_id: Uuid, text: String, attempts: u32) -> Self {
        let digest = Self::compute_digest(&text);
        Self {
            id: Uuid::new_v4(),
            request_id,
            text,
            attempts,
            digest,
            generated_at: Utc::now(),
        }
    }

    /// Recompute the digest and compare.
    pub fn verify(&self) -> bool {
        Self::compute_digest(&self.text) == self.digest
    }

    /// Number of characters in the report.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    fn compute_digest(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_digest_verifies() {
        let report = Report::new(Uuid::new_v4(), "# Summary\nAll good.".to_string(), 2);
        assert!(report.verify());
        assert_eq!(report.attempts, 2);
        assert_eq!(report.digest.len(), 64);
    }

    #[test]
    fn test_tampered_report_fails_verification() {
        let mut report = Report::new(Uuid::new_v4(), "original".to_string(), 1);
        report.text.push_str(" edited");
        assert!(!report.verify());
    }

    #[test]
    fn test_char_count_counts_unicode_scalars() {
        let report = Report::new(Uuid::new_v4(), "Relatório".to_string(), 1);
        assert_eq!(report.char_count(), 9);
    }
}
