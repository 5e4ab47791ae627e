//! Pipeline state machine.
//!
//! Transitions are pure so the retry cap and cancellation rules can be
//! checked without a transport or a runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{clamp_attempts, PipelineConfig};

/// Where a generation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "attempt")]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Attempt `n` issued, no chunk yet.
    Attempting(u32),
    /// Attempt `n` is producing chunks.
    Streaming(u32),
    /// Waiting out the backoff before attempt `n`.
    Retrying(u32),
    /// Report delivered.
    Succeeded,
    /// Ended with an error.
    Failed,
    /// Stopped by the caller.
    Cancelled,
}

impl PipelineState {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::Failed | PipelineState::Cancelled
        )
    }

    /// The attempt in flight or about to start.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            PipelineState::Attempting(n) | PipelineState::Streaming(n) | PipelineState::Retrying(n) => {
                Some(*n)
            }
            _ => None,
        }
    }
}

/// Constant-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: clamp_attempts(max_attempts),
            delay,
        }
    }

    /// Returns true if another attempt may follow attempt `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self::constant(config.max_attempts, config.retry_delay())
    }
}

/// Drives [`PipelineState`] through its transitions.
///
/// Terminal states absorb every input, so at most one terminal state is
/// ever reached.
#[derive(Debug, Clone)]
pub struct PipelineMachine {
    state: PipelineState,
    policy: RetryPolicy,
}

impl PipelineMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: PipelineState::Idle,
            policy,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Idle -> Attempting(1).
    pub fn start(&mut self) -> PipelineState {
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Attempting(1);
        }
        self.state
    }

    /// Attempting(n) -> Streaming(n).
    pub fn chunk_received(&mut self) -> PipelineState {
        if let PipelineState::Attempting(n) = self.state {
            self.state = PipelineState::Streaming(n);
        }
        self.state
    }

    /// Stream ended with usable output.
    pub fn stream_finished(&mut self) -> PipelineState {
        if matches!(
            self.state,
            PipelineState::Attempting(_) | PipelineState::Streaming(_)
        ) {
            self.state = PipelineState::Succeeded;
        }
        self.state
    }

    /// Transient failure of attempt n: Retrying(n + 1) under the cap,
    /// Failed at it.
    pub fn transient_failure(&mut self) -> PipelineState {
        if let PipelineState::Attempting(n) | PipelineState::Streaming(n) = self.state {
            self.state = if self.policy.allows_retry_after(n) {
                PipelineState::Retrying(n + 1)
            } else {
                PipelineState::Failed
            };
        }
        self.state
    }

    /// The service rejected the request. Never retried.
    pub fn rejected(&mut self) -> PipelineState {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
        }
        self.state
    }

    /// Retrying(n) -> Attempting(n).
    pub fn backoff_elapsed(&mut self) -> PipelineState {
        if let PipelineState::Retrying(n) = self.state {
            self.state = PipelineState::Attempting(n);
        }
        self.state
    }

    /// Any non-terminal state -> Cancelled.
    pub fn cancel(&mut self) -> PipelineState {
        if !self.state.is_terminal() {
            self.state = PipelineState::Cancelled;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max: u32) -> PipelineMachine {
        PipelineMachine::new(RetryPolicy::constant(max, Duration::ZERO))
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine(3);
        assert_eq!(m.start(), PipelineState::Attempting(1));
        assert_eq!(m.chunk_received(), PipelineState::Streaming(1));
        assert_eq!(m.chunk_received(), PipelineState::Streaming(1));
        assert_eq!(m.stream_finished(), PipelineState::Succeeded);
    }

    #[test]
    fn test_retry_cap() {
        let mut m = machine(3);
        m.start();
        assert_eq!(m.transient_failure(), PipelineState::Retrying(2));
        assert_eq!(m.backoff_elapsed(), PipelineState::Attempting(2));
        m.chunk_received();
        assert_eq!(m.transient_failure(), PipelineState::Retrying(3));
        m.backoff_elapsed();
        assert_eq!(m.transient_failure(), PipelineState::Failed);
    }

    #[test]
    fn test_policy_caps_attempts() {
        assert_eq!(RetryPolicy::constant(9, Duration::ZERO).max_attempts, 3);
        assert_eq!(RetryPolicy::constant(0, Duration::ZERO).max_attempts, 1);

        let mut m = machine(9);
        m.start();
        assert_eq!(m.transient_failure(), PipelineState::Retrying(2));
        m.backoff_elapsed();
        assert_eq!(m.transient_failure(), PipelineState::Retrying(3));
        m.backoff_elapsed();
        assert_eq!(m.transient_failure(), PipelineState::Failed);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let mut m = machine(1);
        m.start();
        assert_eq!(m.transient_failure(), PipelineState::Failed);
    }

    #[test]
    fn test_rejection_skips_retry() {
        let mut m = machine(3);
        m.start();
        assert_eq!(m.rejected(), PipelineState::Failed);
    }

    #[test]
    fn test_cancel_from_every_live_state() {
        for advance in 0..4 {
            let mut m = machine(3);
            m.start();
            if advance >= 1 {
                m.chunk_received();
            }
            if advance >= 2 {
                m.transient_failure();
            }
            if advance >= 3 {
                m.backoff_elapsed();
            }
            assert_eq!(m.cancel(), PipelineState::Cancelled);
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut m = machine(3);
        m.start();
        m.stream_finished();

        assert_eq!(m.cancel(), PipelineState::Succeeded);
        assert_eq!(m.transient_failure(), PipelineState::Succeeded);
        assert_eq!(m.rejected(), PipelineState::Succeeded);

        let mut m = machine(3);
        m.start();
        m.cancel();
        assert_eq!(m.stream_finished(), PipelineState::Cancelled);
    }

    #[test]
    fn test_attempt_accessor() {
        assert_eq!(PipelineState::Retrying(2).attempt(), Some(2));
        assert_eq!(PipelineState::Idle.attempt(), None);
        assert!(PipelineState::Cancelled.is_terminal());
    }
}
