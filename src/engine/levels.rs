//! Level table and tier resolution.
//!
//! Tiers partition the score axis from zero to infinity into named bands.
//! Resolution is a pure function of the score, so level-up detection is a
//! comparison of two resolutions rather than a fired-once flag.

use serde::{Deserialize, Serialize};

use crate::engine::errors::EngineError;

/// A named band of scores with associated benefits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelTier {
    pub id: String,
    pub min_score: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl LevelTier {
    pub fn new(id: &str, min_score: u64, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            min_score,
            name: name.to_string(),
            description: description.to_string(),
            benefits: Vec::new(),
        }
    }

    pub fn with_benefit(mut self, benefit: &str) -> Self {
        self.benefits.push(benefit.to_string());
        self
    }
}

/// Ordered, validated set of tiers covering the whole score axis.
#[derive(Debug, Clone)]
pub struct LevelTable {
    tiers: Vec<LevelTier>,
}

impl LevelTable {
    /// Build a table from tier definitions, validating the partition: at
    /// least one tier, first at score 0, strictly ascending thresholds,
    /// unique ids.
    pub fn new(tiers: Vec<LevelTier>) -> Result<Self, EngineError> {
        if tiers.is_empty() {
            return Err(EngineError::InvariantViolation(
                "level table must contain at least one tier".to_string(),
            ));
        }
        if tiers[0].min_score != 0 {
            return Err(EngineError::InvariantViolation(format!(
                "first level tier '{}' must start at score 0, starts at {}",
                tiers[0].id, tiers[0].min_score
            )));
        }
        for pair in tiers.windows(2) {
            if pair[1].min_score <= pair[0].min_score {
                return Err(EngineError::InvariantViolation(format!(
                    "level tier '{}' threshold {} does not ascend past '{}' at {}",
                    pair[1].id, pair[1].min_score, pair[0].id, pair[0].min_score
                )));
            }
        }
        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].iter().any(|t| t.id == tier.id) {
                return Err(EngineError::InvariantViolation(format!(
                    "duplicate level tier id '{}'",
                    tier.id
                )));
            }
        }
        Ok(Self { tiers })
    }

    /// Highest tier whose `min_score <= score`. Total by construction.
    pub fn resolve(&self, score: u64) -> &LevelTier {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.min_score <= score)
            .unwrap_or(&self.tiers[0])
    }

    /// The terminal tier; gains beyond it are silent.
    pub fn top(&self) -> &LevelTier {
        &self.tiers[self.tiers.len() - 1]
    }

    pub fn tiers(&self) -> &[LevelTier] {
        &self.tiers
    }

    /// Detect a level-up edge between two scores. Crossing several
    /// boundaries in one update still reports a single transition from the
    /// immediately-previous tier to the new highest tier.
    pub fn level_up(&self, old_score: u64, new_score: u64) -> Option<(LevelTier, LevelTier)> {
        let from = self.resolve(old_score);
        let to = self.resolve(new_score);
        if from.id != to.id && new_score > old_score {
            Some((from.clone(), to.clone()))
        } else {
            None
        }
    }
}

/// Default tier ladder. Thresholds are illustrative configuration, not
/// product-blessed values; hosts override them via `EngineConfig`.
pub fn default_level_table() -> Vec<LevelTier> {
    vec![
        LevelTier::new("standby", 0, "Standby", "Just landed in the community."),
        LevelTier::new("boarding", 100, "Boarding", "Getting into the rhythm.")
            .with_benefit("Custom profile flair"),
        LevelTier::new(
            "frequent_flyer",
            500,
            "Frequent Flyer",
            "A regular around the terminals.",
        )
        .with_benefit("Priority plan listings"),
        LevelTier::new(
            "globetrotter",
            1500,
            "Globetrotter",
            "Cities know this traveler by name.",
        )
        .with_benefit("Early access to city guides"),
        LevelTier::new("captain", 4000, "Captain", "Top of the tower.")
            .with_benefit("Captain badge ring")
            .with_benefit("Beta feature access"),
    ]
}
