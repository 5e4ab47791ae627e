//! Step catalog.
//!
//! The catalog is the immutable description of every step, resolved once at
//! process start. All structural invariants are checked in
//! [`StepCatalogBuilder::build`] so that runtime lookups never need to.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaypointError};
use crate::step::{Step, StepId};
use crate::tier::{Tier, TierTable};

/// Immutable set of steps plus the tier table they reference.
///
/// Deserializing runs the same checks as [`StepCatalogBuilder::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CatalogDocument", into = "CatalogDocument")]
pub struct StepCatalog {
    steps: BTreeMap<StepId, Step>,
    tiers: TierTable,
}

impl StepCatalog {
    /// Create a new StepCatalogBuilder.
    pub fn builder() -> StepCatalogBuilder {
        StepCatalogBuilder::new()
    }

    /// Look up a step, failing with `UnknownStep` on a miss.
    pub fn get(&self, id: StepId) -> Result<&Step> {
        self.steps
            .get(&id)
            .ok_or(WaypointError::UnknownStep { step_id: id })
    }

    /// Check whether a step exists.
    pub fn contains(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    /// All steps, ordered by id.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// All step ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = StepId> + '_ {
        self.steps.keys().copied()
    }

    /// The tier table.
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Steps that can be reached from the initial state: no prerequisites and
    /// gated at the lowest tier.
    pub fn entry_steps(&self) -> Vec<&Step> {
        let lowest = match self.tiers.lowest() {
            Some(t) => t.rank,
            None => return Vec::new(),
        };

        self.steps
            .values()
            .filter(|s| s.is_root() && s.required_tier.rank <= lowest)
            .collect()
    }

    /// Steps flagged as required for report generation.
    pub fn required_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values().filter(|s| s.required)
    }

    /// Steps in dependency order (prerequisites first, ties broken by id).
    pub fn topological_order(&self) -> Vec<StepId> {
        // Validated acyclic at build time, so this always drains every step.
        topological_sort(&self.steps).unwrap_or_default()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Wire form of a catalog: `{ "tiers": [..], "steps": [..] }`.
#[derive(Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default = "TierTable::standard")]
    tiers: TierTable,
    steps: Vec<Step>,
}

impl TryFrom<CatalogDocument> for StepCatalog {
    type Error = WaypointError;

    fn try_from(document: CatalogDocument) -> Result<Self> {
        StepCatalog::builder()
            .tiers(document.tiers)
            .steps(document.steps)
            .build()
    }
}

impl From<StepCatalog> for CatalogDocument {
    fn from(catalog: StepCatalog) -> Self {
        Self {
            tiers: catalog.tiers,
            steps: catalog.steps.into_values().collect(),
        }
    }
}

/// Builder for creating a StepCatalog with a fluent API.
#[derive(Debug, Default)]
pub struct StepCatalogBuilder {
    steps: Vec<Step>,
    tiers: Option<TierTable>,
}

impl StepCatalogBuilder {
    /// Create a new StepCatalogBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tier table. Defaults to [`TierTable::standard`].
    pub fn tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Add a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Add several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Build and validate the catalog.
    pub fn build(self) -> Result<StepCatalog> {
        let tiers = self.tiers.unwrap_or_else(TierTable::standard);
        if tiers.is_empty() {
            return Err(invalid("Tier table cannot be empty"));
        }
        if self.steps.is_empty() {
            return Err(invalid("Catalog must contain at least one step"));
        }

        let mut steps = BTreeMap::new();
        for step in self.steps {
            if step.id.0 == 0 {
                return Err(invalid(format!("Step '{}' has id 0; ids start at 1", step.title)));
            }
            if !tiers.contains(&step.required_tier) {
                return Err(invalid(format!(
                    "Step {} requires tier '{}' which is not in the tier table",
                    step.id, step.required_tier.id
                )));
            }
            if let Some(existing) = steps.insert(step.id, step) {
                return Err(invalid(format!("Duplicate step id {}", existing.id)));
            }
        }

        for step in steps.values() {
            if step.prerequisites.contains(&step.id) {
                return Err(invalid(format!("Step {} lists itself as a prerequisite", step.id)));
            }
            if let Some(missing) = step.prerequisites.iter().find(|p| !steps.contains_key(p)) {
                return Err(invalid(format!(
                    "Step {} requires unknown step {}",
                    step.id, missing
                )));
            }
        }

        if let Err(cycle) = topological_sort(&steps) {
            let path: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
            return Err(invalid(format!(
                "Prerequisite cycle detected: {}",
                path.join(" -> ")
            )));
        }

        let catalog = StepCatalog { steps, tiers };
        if catalog.entry_steps().is_empty() {
            return Err(invalid(
                "No entry step: at least one step needs no prerequisites and the lowest tier",
            ));
        }

        Ok(catalog)
    }
}

fn invalid(message: impl Into<String>) -> WaypointError {
    WaypointError::InvalidCatalog {
        message: message.into(),
    }
}

/// Kahn's algorithm. On a cycle, returns one offending path.
fn topological_sort(steps: &BTreeMap<StepId, Step>) -> std::result::Result<Vec<StepId>, Vec<StepId>> {
    let mut in_degree: BTreeMap<StepId, usize> = steps
        .values()
        .map(|s| (s.id, s.prerequisites.len()))
        .collect();

    let mut dependents: BTreeMap<StepId, Vec<StepId>> = BTreeMap::new();
    for step in steps.values() {
        for prereq in &step.prerequisites {
            dependents.entry(*prereq).or_default().push(step.id);
        }
    }

    let mut ready: BTreeSet<StepId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(steps.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() == steps.len() {
        return Ok(order);
    }

    let placed: BTreeSet<StepId> = order.into_iter().collect();
    Err(find_cycle(steps, &placed))
}

/// Walk prerequisite edges among unplaced steps until a node repeats.
fn find_cycle(steps: &BTreeMap<StepId, Step>, placed: &BTreeSet<StepId>) -> Vec<StepId> {
    let start = match steps.keys().find(|id| !placed.contains(id)) {
        Some(id) => *id,
        None => return Vec::new(),
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = steps[&current]
            .prerequisites
            .iter()
            .find(|p| !placed.contains(p))
            .copied();
        let Some(next) = next else {
            return path;
        };
        if let Some(pos) = path.iter().position(|id| *id == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// Convenience for tests and demos: a catalog where every step is gated at
/// the given tier.
pub fn linear_catalog(count: u32, tier: &Tier) -> Result<StepCatalog> {
    let mut builder = StepCatalog::builder().tiers(TierTable::new([tier.clone()])?);
    for id in 1..=count {
        let mut step = Step::new(id, format!("Step {}", id), tier);
        if id > 1 {
            step = step.after([id - 1]);
        }
        builder = builder.step(step);
    }
    builder.build()
}
