//! Workflow session with a load/save boundary.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};
use waypoint_core::{Result, StepCatalog, StepId, Tier};

use crate::progress::PersistedProgress;
use crate::store::ProgressStore;
use crate::workflow::{Completion, WorkflowState};

/// A `WorkflowState` bound to a key in a progress store.
///
/// The document is read once in [`WorkflowSession::load`] and written after
/// every successful mutation. A mutation is applied to a copy of the state
/// and only kept once the store accepted it, so a failed write leaves the
/// session as it was. Calls for one session must be serialized by the
/// caller.
pub struct WorkflowSession<S: ProgressStore> {
    store: Arc<S>,
    key: String,
    state: WorkflowState,
}

impl<S: ProgressStore> WorkflowSession<S> {
    /// Store key for a user or session identifier.
    pub fn key_for(user: &str) -> String {
        format!("progress:{}", user)
    }

    /// Load a session, starting fresh if the key has no document.
    pub async fn load(
        store: Arc<S>,
        key: impl Into<String>,
        catalog: Arc<StepCatalog>,
        tier: Tier,
    ) -> Result<Self> {
        let key = key.into();
        let state = match store.get(&key).await? {
            Some(entry) => {
                let persisted = PersistedProgress::from_value(entry.value)?;
                info!(
                    "Resuming session '{}' saved at {} ({} completed)",
                    key,
                    persisted.timestamp,
                    persisted.completed_steps.len()
                );
                WorkflowState::restore(catalog, tier, &persisted)?
            }
            None => {
                debug!("No saved progress for '{}', starting fresh", key);
                WorkflowState::new(catalog, tier)?
            }
        };

        Ok(Self { store, key, state })
    }

    /// Read-only view of the state.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// The store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every accessible step.
    pub fn available_steps(&self) -> BTreeSet<StepId> {
        self.state.available_steps()
    }

    /// Complete a step and persist.
    pub async fn complete(&mut self, step_id: StepId, data: serde_json::Value) -> Result<Completion> {
        let mut next = self.state.clone();
        let completion = next.complete(step_id, data)?;
        self.commit(next).await?;
        Ok(completion)
    }

    /// Select the current step and persist.
    pub async fn select_current(&mut self, step_id: StepId) -> Result<()> {
        let mut next = self.state.clone();
        next.select_current(step_id)?;
        self.commit(next).await
    }

    /// Change tier and persist the (possibly moved) current pointer.
    pub async fn set_tier(&mut self, tier: Tier) -> Result<()> {
        let mut next = self.state.clone();
        next.set_tier(tier)?;
        self.commit(next).await
    }

    /// Reset the session and remove its document.
    pub async fn reset(&mut self) -> Result<()> {
        self.store.delete(&self.key).await?;
        self.state.reset();
        Ok(())
    }

    /// Persist `next`, then make it the session state.
    async fn commit(&mut self, next: WorkflowState) -> Result<()> {
        let value = next.snapshot().to_value()?;
        let entry = self.store.set(&self.key, value).await?;
        debug!("Saved progress '{}' (version {})", self.key, entry.version);
        self.state = next;
        Ok(())
    }
}
