//! # Waypoint SDK
//!
//! Wires the workspace together for a UI layer: an HTTP transport for the
//! generation service, parallel supplementary feeds, and a [`Workbench`]
//! that owns one user's session.

pub mod client;
pub mod config;
pub mod feed;
pub mod workbench;

pub use client::HttpTransport;
pub use config::ClientConfig;
pub use feed::{FeedAggregator, FeedBatch, FeedConfig, FeedFailure, FeedItem, FeedSource};
pub use workbench::Workbench;

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::client::HttpTransport;
    pub use crate::config::ClientConfig;
    pub use crate::feed::{FeedAggregator, FeedBatch, FeedSource};
    pub use crate::workbench::Workbench;
    pub use waypoint_core::prelude::*;
    pub use waypoint_generate::{
        GenerationEvent, GenerationHandle, GenerationPipeline, PipelineConfig, ScriptedAttempt,
        ScriptedTransport,
    };
    pub use waypoint_state::{InMemoryProgressStore, JsonFileStore, ProgressStore};
}
