//! Access resolution.
//!
//! A step is accessible iff the tier gate (`required_tier.rank <= tier.rank`)
//! and the prerequisite gate (every prerequisite completed) both hold. Every
//! method here is a pure function of its arguments and the catalog, which is
//! what lets a persisted session resume without replaying anything.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_core::{Result, Step, StepCatalog, StepId, StepStatus, Tier, WaypointError};

/// Why a step is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum AccessDenial {
    /// The caller's tier ranks below the step's tier.
    TierTooLow { required: String, actual: String },
    /// Some prerequisites are not completed.
    MissingPrerequisites { missing: Vec<StepId> },
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDenial::TierTooLow { required, actual } => {
                write!(f, "requires tier '{}' (current: '{}')", required, actual)
            }
            AccessDenial::MissingPrerequisites { missing } => {
                let ids: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
                write!(f, "complete step(s) {} first", ids.join(", "))
            }
        }
    }
}

/// Decides which steps are reachable. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    catalog: Arc<StepCatalog>,
}

impl AccessResolver {
    /// Create a resolver over a catalog.
    pub fn new(catalog: Arc<StepCatalog>) -> Self {
        Self { catalog }
    }

    /// The catalog this resolver reads.
    pub fn catalog(&self) -> &Arc<StepCatalog> {
        &self.catalog
    }

    /// Check both gates for one step.
    pub fn is_accessible(
        &self,
        step_id: StepId,
        tier: &Tier,
        completed: &BTreeSet<StepId>,
    ) -> Result<bool> {
        let step = self.catalog.get(step_id)?;
        Ok(Self::gates_pass(step, tier, completed))
    }

    /// Every accessible step. Completed steps stay accessible.
    pub fn available_steps(&self, tier: &Tier, completed: &BTreeSet<StepId>) -> BTreeSet<StepId> {
        let available: BTreeSet<StepId> = self
            .catalog
            .steps()
            .filter(|step| Self::gates_pass(step, tier, completed))
            .map(|step| step.id)
            .collect();

        debug!(
            tier = %tier.id,
            completed = completed.len(),
            available = available.len(),
            "Resolved available steps"
        );
        available
    }

    /// Explain which gate blocks a step, or `None` if it is accessible.
    ///
    /// The tier gate is reported first when both fail.
    pub fn denial(
        &self,
        step_id: StepId,
        tier: &Tier,
        completed: &BTreeSet<StepId>,
    ) -> Result<Option<AccessDenial>> {
        let step = self.catalog.get(step_id)?;

        if !tier.satisfies(&step.required_tier) {
            return Ok(Some(AccessDenial::TierTooLow {
                required: step.required_tier.id.clone(),
                actual: tier.id.clone(),
            }));
        }

        let missing: Vec<StepId> = step
            .prerequisites
            .iter()
            .filter(|p| !completed.contains(p))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Ok(Some(AccessDenial::MissingPrerequisites { missing }));
        }

        Ok(None)
    }

    /// Fail with `InaccessibleStep` unless the step is accessible.
    pub fn ensure_accessible(
        &self,
        step_id: StepId,
        tier: &Tier,
        completed: &BTreeSet<StepId>,
    ) -> Result<()> {
        match self.denial(step_id, tier, completed)? {
            None => Ok(()),
            Some(denial) => Err(WaypointError::InaccessibleStep {
                step_id,
                reason: denial.to_string(),
            }),
        }
    }

    /// Derive the display status of a step.
    pub fn status(
        &self,
        step_id: StepId,
        tier: &Tier,
        completed: &BTreeSet<StepId>,
        current: StepId,
    ) -> Result<StepStatus> {
        let step = self.catalog.get(step_id)?;

        let status = if completed.contains(&step_id) {
            StepStatus::Completed
        } else if step_id == current {
            StepStatus::Current
        } else if Self::gates_pass(step, tier, completed) {
            StepStatus::Unlocked
        } else {
            StepStatus::Locked
        };
        Ok(status)
    }

    /// Lowest-id accessible step that is not completed yet.
    pub fn next_step(&self, tier: &Tier, completed: &BTreeSet<StepId>) -> Option<StepId> {
        self.catalog
            .steps()
            .filter(|step| !completed.contains(&step.id))
            .find(|step| Self::gates_pass(step, tier, completed))
            .map(|step| step.id)
    }

    /// The step a fresh session starts on.
    pub fn initial_step(&self) -> StepId {
        self.catalog
            .entry_steps()
            .first()
            .map(|step| step.id)
            // Catalog construction guarantees an entry step.
            .unwrap_or(StepId(1))
    }

    /// Required steps not yet completed, ascending.
    pub fn outstanding_required(&self, completed: &BTreeSet<StepId>) -> Vec<StepId> {
        self.catalog
            .required_steps()
            .filter(|step| !completed.contains(&step.id))
            .map(|step| step.id)
            .collect()
    }

    /// `(completed, total)` counting only ids present in the catalog.
    pub fn progress(&self, completed: &BTreeSet<StepId>) -> (u32, u32) {
        let done = completed
            .iter()
            .filter(|id| self.catalog.contains(**id))
            .count();
        (done as u32, self.catalog.len() as u32)
    }

    fn gates_pass(step: &Step, tier: &Tier, completed: &BTreeSet<StepId>) -> bool {
        tier.satisfies(&step.required_tier) && step.prerequisites.is_subset(completed)
    }
}
