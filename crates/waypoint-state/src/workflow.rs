//! Workflow session state.
//!
//! `WorkflowState` is the single mutable object of a session. Fields are
//! private; mutation goes through [`WorkflowState::complete`],
//! [`WorkflowState::select_current`], [`WorkflowState::set_tier`] and
//! [`WorkflowState::reset`], so the invariants live here and nowhere else:
//!
//! - `completed` only grows, except on explicit `reset`.
//! - `current` always names a step in the catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use waypoint_core::{AggregateScores, Result, StepCatalog, StepId, StepStatus, Tier, WaypointError};
use waypoint_resolver::{AccessResolver, ScoreAggregator};

use crate::progress::PersistedProgress;

/// Result of a `complete` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// False when the step was already completed (payload overwritten only).
    pub newly_completed: bool,

    /// Steps that became accessible because of this completion.
    pub unlocked: BTreeSet<StepId>,
}

/// Mutable per-session state.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    resolver: AccessResolver,
    tier: Tier,
    completed: BTreeSet<StepId>,
    current: StepId,
    payload: BTreeMap<StepId, serde_json::Value>,
}

impl WorkflowState {
    /// Start a fresh session on the catalog's first entry step.
    ///
    /// `tier` must be one of the catalog's tiers.
    pub fn new(catalog: Arc<StepCatalog>, tier: Tier) -> Result<Self> {
        check_tier(&catalog, &tier)?;
        let resolver = AccessResolver::new(catalog);
        let current = resolver.initial_step();
        Ok(Self {
            resolver,
            tier,
            completed: BTreeSet::new(),
            current,
            payload: BTreeMap::new(),
        })
    }

    /// Rebuild a session from a persisted document.
    ///
    /// Ids the catalog no longer knows are dropped. An unknown or
    /// inaccessible current step falls back to the next reachable step.
    pub fn restore(
        catalog: Arc<StepCatalog>,
        tier: Tier,
        persisted: &PersistedProgress,
    ) -> Result<Self> {
        let mut state = Self::new(catalog, tier)?;

        for id in persisted.completed_set() {
            if state.resolver.catalog().contains(id) {
                state.completed.insert(id);
            } else {
                warn!("Dropping unknown completed step {} from persisted progress", id);
            }
        }

        let wanted = persisted.current_step;
        match state
            .resolver
            .is_accessible(wanted, &state.tier, &state.completed)
        {
            Ok(true) => state.current = wanted,
            Ok(false) | Err(_) => {
                warn!("Persisted current step {} is not reachable, falling back", wanted);
                state.current = state.fallback_current();
            }
        }

        debug!(
            completed = state.completed.len(),
            current = %state.current,
            "Restored workflow state"
        );
        Ok(state)
    }

    /// The resolver bound to this session's catalog.
    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    /// The catalog.
    pub fn catalog(&self) -> &Arc<StepCatalog> {
        self.resolver.catalog()
    }

    /// The session's tier.
    pub fn tier(&self) -> &Tier {
        &self.tier
    }

    /// Completed step ids.
    pub fn completed(&self) -> &BTreeSet<StepId> {
        &self.completed
    }

    /// The current step.
    pub fn current(&self) -> StepId {
        self.current
    }

    /// Payload recorded for a step.
    pub fn payload(&self, step_id: StepId) -> Option<&serde_json::Value> {
        self.payload.get(&step_id)
    }

    /// Check whether a step is accessible now.
    pub fn is_accessible(&self, step_id: StepId) -> Result<bool> {
        self.resolver
            .is_accessible(step_id, &self.tier, &self.completed)
    }

    /// Every accessible step.
    pub fn available_steps(&self) -> BTreeSet<StepId> {
        self.resolver.available_steps(&self.tier, &self.completed)
    }

    /// Derived status of a step.
    pub fn status(&self, step_id: StepId) -> Result<StepStatus> {
        self.resolver
            .status(step_id, &self.tier, &self.completed, self.current)
    }

    /// Scores for the completed steps under the session's tier.
    pub fn scores(&self) -> AggregateScores {
        ScoreAggregator::aggregate(self.catalog(), &self.completed, &self.tier)
    }

    /// `(completed, total)` step counts.
    pub fn progress(&self) -> (u32, u32) {
        self.resolver.progress(&self.completed)
    }

    /// Move the current pointer. Fails with `InaccessibleStep` unless both
    /// gates pass.
    pub fn select_current(&mut self, step_id: StepId) -> Result<()> {
        self.resolver
            .ensure_accessible(step_id, &self.tier, &self.completed)?;
        self.current = step_id;
        debug!("Current step set to {}", step_id);
        Ok(())
    }

    /// Mark a step completed and record its payload.
    ///
    /// Idempotent for the completed set: repeating the call only overwrites
    /// the payload. Gates are not enforced here; dependents still unlock only
    /// when their own prerequisites are met.
    pub fn complete(&mut self, step_id: StepId, data: serde_json::Value) -> Result<Completion> {
        self.catalog().get(step_id)?;

        let before = self.available_steps();
        let newly_completed = self.completed.insert(step_id);
        self.payload.insert(step_id, data);
        let after = self.available_steps();

        let unlocked: BTreeSet<StepId> = after.difference(&before).copied().collect();
        if newly_completed {
            info!(
                step = %step_id,
                unlocked = unlocked.len(),
                "Step completed"
            );
        } else {
            debug!("Step {} already completed, payload replaced", step_id);
        }

        Ok(Completion {
            newly_completed,
            unlocked,
        })
    }

    /// Change the session tier. The completed set is untouched; if the
    /// current step is no longer reachable, the pointer falls back.
    /// A tier outside the catalog's table is rejected.
    pub fn set_tier(&mut self, tier: Tier) -> Result<()> {
        check_tier(self.catalog(), &tier)?;
        info!("Tier changed from '{}' to '{}'", self.tier.id, tier.id);
        self.tier = tier;

        if !self.is_accessible(self.current).unwrap_or(false) {
            self.current = self.fallback_current();
        }
        Ok(())
    }

    /// Explicit session reset: the only way `completed` shrinks.
    pub fn reset(&mut self) {
        info!("Resetting workflow state ({} completed steps cleared)", self.completed.len());
        self.completed.clear();
        self.payload.clear();
        self.current = self.resolver.initial_step();
    }

    /// Capture the persisted document for this state.
    pub fn snapshot(&self) -> PersistedProgress {
        PersistedProgress::capture(&self.completed, self.current)
    }

    fn fallback_current(&self) -> StepId {
        self.resolver
            .next_step(&self.tier, &self.completed)
            .unwrap_or_else(|| self.resolver.initial_step())
    }
}

fn check_tier(catalog: &StepCatalog, tier: &Tier) -> Result<()> {
    if catalog.tiers().contains(tier) {
        Ok(())
    } else {
        Err(WaypointError::Validation {
            missing: vec!["tier".to_string()],
            message: format!("unknown tier '{}'", tier.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{Step, TierTable};

    fn tier(id: &str) -> Tier {
        TierTable::standard().get(id).unwrap().clone()
    }

    fn catalog() -> Arc<StepCatalog> {
        Arc::new(
            StepCatalog::builder()
                .step(Step::new(1, "Profile", &tier("basic")).weighted(10.0, 3.0, 2.0))
                .step(Step::new(2, "Market", &tier("basic")).after([1]).weighted(4.0, 1.0, 1.0))
                .step(Step::new(3, "Modules", &tier("professional")).after([1, 2]))
                .build()
                .unwrap(),
        )
    }

    fn ids(raw: &[u32]) -> BTreeSet<StepId> {
        raw.iter().map(|id| StepId(*id)).collect()
    }

    #[test]
    fn test_new_state_starts_on_entry_step() {
        let state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        assert_eq!(state.current(), StepId(1));
        assert!(state.completed().is_empty());
        assert_eq!(state.status(StepId(1)).unwrap(), StepStatus::Current);
    }

    #[test]
    fn test_complete_reports_unlocked_steps() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();

        let completion = state.complete(StepId(1), serde_json::json!({"a": 1})).unwrap();
        assert!(completion.newly_completed);
        assert_eq!(completion.unlocked, ids(&[2]));

        let completion = state.complete(StepId(2), serde_json::json!({})).unwrap();
        // Step 3 stays locked behind the tier gate.
        assert!(completion.unlocked.is_empty());
        assert_eq!(state.available_steps(), ids(&[1, 2]));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();

        state.complete(StepId(1), serde_json::json!("first")).unwrap();
        let scores_once = state.scores();
        let again = state.complete(StepId(1), serde_json::json!("second")).unwrap();

        assert!(!again.newly_completed);
        assert!(again.unlocked.is_empty());
        assert_eq!(state.completed(), &ids(&[1]));
        assert_eq!(state.payload(StepId(1)), Some(&serde_json::json!("second")));
        assert_eq!(state.scores(), scores_once);
    }

    #[test]
    fn test_completed_never_shrinks() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        let mut previous = BTreeSet::new();

        for id in [2, 1, 2, 3, 1] {
            state.complete(StepId(id), serde_json::Value::Null).unwrap();
            assert!(previous.is_subset(state.completed()));
            previous = state.completed().clone();
        }
        assert_eq!(state.completed(), &ids(&[1, 2, 3]));
    }

    #[test]
    fn test_complete_out_of_order_is_allowed() {
        let mut state = WorkflowState::new(catalog(), tier("professional")).unwrap();

        // Step 3 completed before its prerequisites.
        state.complete(StepId(3), serde_json::Value::Null).unwrap();
        assert!(state.completed().contains(&StepId(3)));
        assert!(!state.is_accessible(StepId(3)).unwrap());
    }

    #[test]
    fn test_complete_unknown_step() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        let err = state.complete(StepId(9), serde_json::Value::Null).unwrap_err();
        assert_eq!(err, WaypointError::UnknownStep { step_id: StepId(9) });
        assert!(state.completed().is_empty());
    }

    #[test]
    fn test_select_current_enforces_gates() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();

        let err = state.select_current(StepId(2)).unwrap_err();
        assert!(matches!(err, WaypointError::InaccessibleStep { .. }));
        assert_eq!(state.current(), StepId(1));

        state.complete(StepId(1), serde_json::Value::Null).unwrap();
        state.select_current(StepId(2)).unwrap();
        assert_eq!(state.current(), StepId(2));

        assert!(matches!(
            state.select_current(StepId(77)),
            Err(WaypointError::UnknownStep { .. })
        ));
    }

    #[test]
    fn test_tier_upgrade_unlocks_and_downgrade_falls_back() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        state.complete(StepId(1), serde_json::Value::Null).unwrap();
        state.complete(StepId(2), serde_json::Value::Null).unwrap();

        state.set_tier(tier("professional")).unwrap();
        assert_eq!(state.available_steps(), ids(&[1, 2, 3]));
        state.select_current(StepId(3)).unwrap();

        state.set_tier(tier("basic")).unwrap();
        assert_eq!(state.completed(), &ids(&[1, 2]));
        assert_ne!(state.current(), StepId(3));
        assert!(state.is_accessible(state.current()).unwrap());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        state.complete(StepId(1), serde_json::json!(1)).unwrap();
        state.select_current(StepId(2)).unwrap();

        state.reset();
        assert!(state.completed().is_empty());
        assert!(state.payload(StepId(1)).is_none());
        assert_eq!(state.current(), StepId(1));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        state.complete(StepId(1), serde_json::Value::Null).unwrap();
        state.select_current(StepId(2)).unwrap();

        let snapshot = state.snapshot();
        let restored = WorkflowState::restore(catalog(), tier("basic"), &snapshot).unwrap();

        assert_eq!(restored.completed(), state.completed());
        assert_eq!(restored.current(), StepId(2));
        assert_eq!(restored.available_steps(), state.available_steps());
    }

    #[test]
    fn test_restore_drops_unknown_and_unreachable() {
        let persisted = PersistedProgress {
            completed_steps: vec![StepId(1), StepId(50)],
            current_step: StepId(3),
            timestamp: chrono::Utc::now(),
        };
        let restored = WorkflowState::restore(catalog(), tier("basic"), &persisted).unwrap();

        assert_eq!(restored.completed(), &ids(&[1]));
        assert_eq!(restored.current(), StepId(2));
    }

    #[test]
    fn test_scores_follow_tier() {
        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        state.complete(StepId(1), serde_json::Value::Null).unwrap();
        assert_eq!(state.scores().total, 15);

        state.set_tier(tier("professional")).unwrap();
        assert_eq!(state.scores().total, 17);
        assert_eq!(state.scores().scaled_opportunities, 12);
        assert_eq!(state.progress(), (1, 3));
    }

    #[test]
    fn test_tier_outside_catalog_is_rejected() {
        let platinum = Tier::new("platinum", 2.0, 99).unwrap();
        let err = WorkflowState::new(catalog(), platinum.clone()).unwrap_err();
        assert!(matches!(&err, WaypointError::Validation { missing, .. } if missing == &vec!["tier".to_string()]));

        // Known id with a different rank is not the catalog's tier either.
        let forged = Tier::new("basic", 1.0, 99).unwrap();
        assert!(WorkflowState::new(catalog(), forged.clone()).is_err());

        let persisted = PersistedProgress::capture(&ids(&[1]), StepId(1));
        assert!(WorkflowState::restore(catalog(), platinum, &persisted).is_err());

        let mut state = WorkflowState::new(catalog(), tier("basic")).unwrap();
        state.complete(StepId(1), serde_json::Value::Null).unwrap();
        state.complete(StepId(2), serde_json::Value::Null).unwrap();
        assert!(state.set_tier(forged).unwrap_err().is_validation());
        assert_eq!(state.tier(), &tier("basic"));
        assert_eq!(state.status(StepId(3)).unwrap(), StepStatus::Locked);
    }
}
