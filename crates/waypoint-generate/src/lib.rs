//! # Waypoint Generate
//!
//! Orchestrates a streamed call to an external text-generation service:
//! chunks are forwarded as they arrive, transient failures are retried on a
//! constant backoff up to a fixed cap, and the caller can cancel at any point.

pub mod attempt;
pub mod config;
pub mod event;
pub mod machine;
pub mod pipeline;
pub mod scripted;
pub mod slot;
pub mod transport;

pub use attempt::GenerationAttempt;
pub use config::{PipelineConfig, MAX_ATTEMPTS};
pub use event::GenerationEvent;
pub use machine::{PipelineMachine, PipelineState, RetryPolicy};
pub use pipeline::{CancelToken, GenerationHandle, GenerationPipeline};
pub use scripted::{ScriptedAttempt, ScriptedTransport};
pub use slot::GenerationSlot;
pub use transport::{ChunkStream, FailureClass, GenerationTransport, TransportError};
