//! # Waypoint Resolver
//!
//! Pure functions over the step catalog: which steps are reachable for a
//! tier and completed set, and what the completed steps are worth.

pub mod access;
pub mod scoring;

pub use access::{AccessDenial, AccessResolver};
pub use scoring::ScoreAggregator;
