//! Step types.
//!
//! A Step is one unit of the guided workflow. Steps are created once from
//! static configuration and never mutated.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Stable identifier of a step (1..N).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u32);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StepId {
    fn from(id: u32) -> Self {
        StepId(id)
    }
}

/// Scoring weights contributed by a completed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StepWeight {
    /// Market-opportunity weight (scaled by the tier multiplier).
    pub opportunity: f64,

    /// Process/module weight.
    pub module: f64,

    /// Complexity weight.
    pub complexity: f64,
}

impl StepWeight {
    /// Create a weight triple.
    pub fn new(opportunity: f64, module: f64, complexity: f64) -> Self {
        Self {
            opportunity,
            module,
            complexity,
        }
    }
}

/// One unit of the guided workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique, stable identifier.
    pub id: StepId,

    /// Human-readable title.
    pub title: String,

    /// Minimum tier needed to reach this step.
    pub required_tier: Tier,

    /// Steps that must be completed first.
    #[serde(default)]
    pub prerequisites: BTreeSet<StepId>,

    /// Scoring weights.
    #[serde(default)]
    pub weight: StepWeight,

    /// Whether the step must be completed before a report can be generated.
    #[serde(default)]
    pub required: bool,
}

impl Step {
    /// Create a step with no prerequisites and zero weight.
    pub fn new(id: impl Into<StepId>, title: impl Into<String>, required_tier: &Tier) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            required_tier: required_tier.clone(),
            prerequisites: BTreeSet::new(),
            weight: StepWeight::default(),
            required: false,
        }
    }

    /// Add prerequisite steps.
    pub fn after<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    /// Set the scoring weights.
    pub fn weighted(mut self, opportunity: f64, module: f64, complexity: f64) -> Self {
        self.weight = StepWeight::new(opportunity, module, complexity);
        self
    }

    /// Mark the step as required for report generation.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns true if the step has no prerequisites.
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }
}
