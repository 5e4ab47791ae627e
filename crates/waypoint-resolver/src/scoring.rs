//! Score aggregation.

use std::collections::BTreeSet;

use tracing::debug;
use waypoint_core::{AggregateScores, StepCatalog, StepId, Tier};

/// Turns completed steps into weighted metrics.
///
/// Only the opportunity component is scaled by the tier multiplier; module
/// and complexity weights are tier-invariant.
pub struct ScoreAggregator;

impl ScoreAggregator {
    /// Aggregate the weights of every completed step present in the catalog.
    pub fn aggregate(
        catalog: &StepCatalog,
        completed: &BTreeSet<StepId>,
        tier: &Tier,
    ) -> AggregateScores {
        let mut opportunities = 0.0;
        let mut modules = 0.0;
        let mut complexity = 0.0;

        for id in completed {
            let Ok(step) = catalog.get(*id) else {
                debug!("Ignoring completed step {} missing from catalog", id);
                continue;
            };
            opportunities += step.weight.opportunity;
            modules += step.weight.module;
            complexity += step.weight.complexity;
        }

        let scaled = opportunities * tier.scoring_multiplier;

        AggregateScores {
            total: round_half_up(scaled + modules + complexity),
            opportunities,
            modules,
            complexity,
            scaled_opportunities: round_half_up(scaled),
        }
    }
}

/// Round to the nearest integer, halves toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
