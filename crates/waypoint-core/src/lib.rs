//! # Waypoint Core
//!
//! Core primitives and types for Waypoint guided workflows.
//!
//! This crate provides the fundamental building blocks:
//! - [`Step`] and [`StepCatalog`] - the immutable workflow description
//! - [`Tier`] and [`TierTable`] - ranked access classes with scoring multipliers
//! - [`GenerationRequest`] - input to a report generation
//! - [`Report`] - the durable generated artifact
//! - [`WaypointError`] - error taxonomy shared by every crate

pub mod artifact;
pub mod catalog;
pub mod error;
pub mod request;
pub mod step;
pub mod tier;
pub mod types;

// Re-exports for convenience
pub use artifact::Report;
pub use catalog::{linear_catalog, StepCatalog, StepCatalogBuilder};
pub use error::{Result, WaypointError};
pub use request::{
    GenerationOptions, GenerationRequest, GenerationRequestBuilder, Profile, ReportFormat,
    ReportLength, ReportStyle,
};
pub use step::{Step, StepId, StepWeight};
pub use tier::{Tier, TierTable};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::artifact::Report;
    pub use crate::catalog::StepCatalog;
    pub use crate::error::{Result, WaypointError};
    pub use crate::request::{GenerationOptions, GenerationRequest, Profile};
    pub use crate::step::{Step, StepId, StepWeight};
    pub use crate::tier::{Tier, TierTable};
    pub use crate::types::{AggregateScores, StepStatus};
}
