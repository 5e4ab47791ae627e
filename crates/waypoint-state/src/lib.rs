//! # Waypoint State
//!
//! The mutable half of a session: which steps are completed, which one is
//! current, and the load/save boundary to an external key-value store.

pub mod progress;
pub mod session;
pub mod store;
pub mod workflow;

pub use progress::PersistedProgress;
pub use session::WorkflowSession;
pub use store::{InMemoryProgressStore, JsonFileStore, ProgressStore, StoreEntry};
pub use workflow::{Completion, WorkflowState};
