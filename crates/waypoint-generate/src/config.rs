//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound on attempts per generation, and the default.
pub const MAX_ATTEMPTS: u32 = 3;

/// Clamp an attempt count into `1..=MAX_ATTEMPTS`.
pub fn clamp_attempts(max_attempts: u32) -> u32 {
    max_attempts.clamp(1, MAX_ATTEMPTS)
}

fn deserialize_max_attempts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    u32::deserialize(deserializer).map(clamp_attempts)
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    1500
}

fn default_idle_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_channel_capacity() -> usize {
    64
}

/// Configuration for [`GenerationPipeline`](crate::GenerationPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total attempts, including the first. Clamped to `1..=MAX_ATTEMPTS`.
    #[serde(
        default = "default_max_attempts",
        deserialize_with = "deserialize_max_attempts"
    )]
    pub max_attempts: u32,

    /// Constant delay between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Longest silence tolerated between chunks before the attempt is
    /// abandoned as transient. `None` waits forever.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: Option<u64>,

    /// Buffered events per generation.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Set the attempt cap, clamped to `1..=MAX_ATTEMPTS`.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = clamp_attempts(max_attempts);
        self
    }

    /// Set the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set or clear the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}
