//! Tier types.
//!
//! Tiers form a total order by `rank`: a higher-rank tier can access
//! everything a lower-rank tier can, plus more.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaypointError};

/// A ranked user classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Stable identifier (e.g. "basic").
    pub id: String,

    /// Multiplier applied to the opportunity component of scores. Always > 0.
    pub scoring_multiplier: f64,

    /// Position in the total order; higher ranks see more.
    pub rank: u32,
}

impl Tier {
    /// Create a tier, rejecting non-positive multipliers.
    pub fn new(id: impl Into<String>, scoring_multiplier: f64, rank: u32) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WaypointError::InvalidCatalog {
                message: "Tier id cannot be empty".to_string(),
            });
        }
        if scoring_multiplier <= 0.0 || !scoring_multiplier.is_finite() {
            return Err(WaypointError::InvalidCatalog {
                message: format!(
                    "Tier '{}' must have a positive multiplier, got {}",
                    id, scoring_multiplier
                ),
            });
        }

        Ok(Self {
            id,
            scoring_multiplier,
            rank,
        })
    }

    /// Returns true if this tier can access content gated at `required`.
    pub fn satisfies(&self, required: &Tier) -> bool {
        required.rank <= self.rank
    }
}

/// Immutable lookup table of tiers, resolved once at startup.
///
/// Serialized as a list of tiers; deserializing goes through
/// [`TierTable::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierTable {
    tiers: BTreeMap<String, Tier>,
}

impl TierTable {
    /// Build a table, rejecting invalid tiers and duplicate ids or ranks.
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for tier in tiers {
            let tier = Tier::new(tier.id, tier.scoring_multiplier, tier.rank)?;
            if table.values().any(|t: &Tier| t.rank == tier.rank) {
                return Err(WaypointError::InvalidCatalog {
                    message: format!("Duplicate tier rank {} for '{}'", tier.rank, tier.id),
                });
            }
            if table.contains_key(&tier.id) {
                return Err(WaypointError::InvalidCatalog {
                    message: format!("Duplicate tier id '{}'", tier.id),
                });
            }
            table.insert(tier.id.clone(), tier);
        }

        Ok(Self { tiers: table })
    }

    /// The three tiers used by the stock catalog.
    pub fn standard() -> Self {
        let tiers = [
            Tier {
                id: "basic".to_string(),
                scoring_multiplier: 1.0,
                rank: 0,
            },
            Tier {
                id: "professional".to_string(),
                scoring_multiplier: 1.2,
                rank: 1,
            },
            Tier {
                id: "enterprise".to_string(),
                scoring_multiplier: 1.5,
                rank: 2,
            },
        ];

        Self {
            tiers: tiers.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Get a tier by id.
    pub fn get(&self, id: &str) -> Option<&Tier> {
        self.tiers.get(id)
    }

    /// Resolve a tier id supplied by the profile collaborator.
    pub fn resolve(&self, id: &str) -> Result<Tier> {
        self.get(id).cloned().ok_or_else(|| WaypointError::Validation {
            missing: vec!["tier".to_string()],
            message: format!("unknown tier '{}'", id),
        })
    }

    /// The lowest-rank tier.
    pub fn lowest(&self) -> Option<&Tier> {
        self.tiers.values().min_by_key(|t| t.rank)
    }

    /// Tiers ordered by rank, lowest first.
    pub fn ordered(&self) -> Vec<&Tier> {
        let mut tiers: Vec<&Tier> = self.tiers.values().collect();
        tiers.sort_by_key(|t| t.rank);
        tiers
    }

    /// Returns true if the table holds exactly this tier.
    pub fn contains(&self, tier: &Tier) -> bool {
        self.tiers.get(&tier.id) == Some(tier)
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl TryFrom<Vec<Tier>> for TierTable {
    type Error = WaypointError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<Tier> {
    fn from(table: TierTable) -> Self {
        let mut tiers: Vec<Tier> = table.tiers.into_values().collect();
        tiers.sort_by_key(|t| t.rank);
        tiers
    }
}
