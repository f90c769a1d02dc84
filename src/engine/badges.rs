//! Badge catalog and predicate evaluation.
//!
//! Predicates are data, not closures: a [`BadgeRule`] is a small AST over
//! [`UserStatistics`] only, so evaluation is deterministic and replayable and
//! the whole catalog can be shipped as seed configuration. Rules over plain
//! counters are monotone (counters only increase), which is what makes the
//! single forward pass in [`BadgeCatalog::evaluate`] sufficient; streak-based
//! rules may stop matching after a reset and are simply re-checked on every
//! update.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::engine::errors::EngineError;
use crate::engine::types::{counters, dimensions, BadgeSummary, UserStatistics};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BadgeRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Exploration,
    Social,
    Content,
    Hosting,
    Dedication,
}

/// Deterministic predicate over a statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum BadgeRule {
    /// A named counter has reached a threshold.
    CounterAtLeast { counter: String, required: u64 },
    /// A single key under a dimension has reached a threshold
    /// (e.g. five check-ins in one city).
    CategoryCountAtLeast {
        dimension: String,
        key: String,
        required: u64,
    },
    /// The number of distinct keys under a dimension has reached a threshold
    /// (e.g. visited five different cities).
    DistinctCategoriesAtLeast { dimension: String, required: u64 },
    /// Current streak length has reached a threshold. Not monotone: a streak
    /// can reset, and this rule is allowed to stop matching.
    StreakAtLeast { days: u32 },
    /// Attendance rate has reached a percentage, once enough plans have been
    /// joined for the rate to be meaningful.
    AttendanceRateAtLeast { percent: u8, min_joined: u64 },
    /// Every sub-rule is satisfied.
    AllOf { rules: Vec<BadgeRule> },
}

impl BadgeRule {
    pub fn is_satisfied(&self, stats: &UserStatistics) -> bool {
        match self {
            BadgeRule::CounterAtLeast { counter, required } => stats.counter(counter) >= *required,
            BadgeRule::CategoryCountAtLeast {
                dimension,
                key,
                required,
            } => stats.category_count(dimension, key) >= *required,
            BadgeRule::DistinctCategoriesAtLeast {
                dimension,
                required,
            } => stats.distinct_categories(dimension) as u64 >= *required,
            BadgeRule::StreakAtLeast { days } => stats.current_streak_days >= *days,
            BadgeRule::AttendanceRateAtLeast {
                percent,
                min_joined,
            } => {
                stats.counter(counters::PLANS_JOINED) >= *min_joined
                    && stats
                        .attendance_rate()
                        .map(|rate| rate * 100.0 >= *percent as f64)
                        .unwrap_or(false)
            }
            BadgeRule::AllOf { rules } => rules.iter().all(|rule| rule.is_satisfied(stats)),
        }
    }

    /// Fraction of the requirement met, in `[0,1]`. Independent of
    /// [`Self::is_satisfied`] so progress bars never affect award logic.
    pub fn progress(&self, stats: &UserStatistics) -> f64 {
        fn ratio(have: f64, need: f64) -> f64 {
            if need <= 0.0 {
                1.0
            } else {
                (have / need).clamp(0.0, 1.0)
            }
        }
        match self {
            BadgeRule::CounterAtLeast { counter, required } => {
                ratio(stats.counter(counter) as f64, *required as f64)
            }
            BadgeRule::CategoryCountAtLeast {
                dimension,
                key,
                required,
            } => ratio(
                stats.category_count(dimension, key) as f64,
                *required as f64,
            ),
            BadgeRule::DistinctCategoriesAtLeast {
                dimension,
                required,
            } => ratio(stats.distinct_categories(dimension) as f64, *required as f64),
            BadgeRule::StreakAtLeast { days } => {
                ratio(stats.current_streak_days as f64, *days as f64)
            }
            BadgeRule::AttendanceRateAtLeast { percent, .. } => ratio(
                stats.attendance_rate().unwrap_or(0.0) * 100.0,
                *percent as f64,
            ),
            BadgeRule::AllOf { rules } => {
                if rules.is_empty() {
                    1.0
                } else {
                    rules.iter().map(|r| r.progress(stats)).sum::<f64>() / rules.len() as f64
                }
            }
        }
    }
}

/// Immutable badge configuration loaded at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: BadgeRarity,
    pub category: BadgeCategory,
    pub rule: BadgeRule,
    /// Extra score granted once, through the ledger-gated bonus path.
    #[serde(default)]
    pub score_bonus: u64,
}

impl BadgeDefinition {
    pub fn summary(&self) -> BadgeSummary {
        BadgeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            rarity: self.rarity,
        }
    }

    pub fn progress(&self, stats: &UserStatistics) -> f64 {
        self.rule.progress(stats)
    }
}

/// Ordered badge catalog. Declaration order is the notification order for
/// badges unlocked by the same event.
#[derive(Debug, Clone)]
pub struct BadgeCatalog {
    badges: Vec<BadgeDefinition>,
}

impl BadgeCatalog {
    pub fn new(badges: Vec<BadgeDefinition>) -> Result<Self, EngineError> {
        for (i, badge) in badges.iter().enumerate() {
            if badges[..i].iter().any(|b| b.id == badge.id) {
                return Err(EngineError::InvariantViolation(format!(
                    "duplicate badge id '{}'",
                    badge.id
                )));
            }
        }
        Ok(Self { badges })
    }

    pub fn get(&self, badge_id: &str) -> Result<&BadgeDefinition, EngineError> {
        self.badges
            .iter()
            .find(|b| b.id == badge_id)
            .ok_or_else(|| EngineError::UnknownBadge(badge_id.to_string()))
    }

    pub fn badges(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    /// Single forward pass: skip already-earned ids, keep satisfied rules,
    /// preserve declaration order. New catalog entries need no migration —
    /// they are simply evaluated here the next time an event fires.
    pub fn evaluate<'a>(
        &'a self,
        stats: &UserStatistics,
        already_earned: &HashSet<String>,
    ) -> Vec<&'a BadgeDefinition> {
        self.badges
            .iter()
            .filter(|badge| !already_earned.contains(&badge.id))
            .filter(|badge| badge.rule.is_satisfied(stats))
            .collect()
    }
}

/// Default badge catalog. Like the level ladder these are illustrative
/// values; hosts supply their own catalog via `EngineConfig`.
pub fn seed_badge_catalog() -> Vec<BadgeDefinition> {
    vec![
        BadgeDefinition {
            id: "first_layover".to_string(),
            name: "First Layover".to_string(),
            description: "Checked in for the first time.".to_string(),
            rarity: BadgeRarity::Common,
            category: BadgeCategory::Exploration,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::TOTAL_CHECK_INS.to_string(),
                required: 1,
            },
            score_bonus: 10,
        },
        BadgeDefinition {
            id: "city_hopper".to_string(),
            name: "City Hopper".to_string(),
            description: "Checked in across five different cities.".to_string(),
            rarity: BadgeRarity::Uncommon,
            category: BadgeCategory::Exploration,
            rule: BadgeRule::DistinctCategoriesAtLeast {
                dimension: dimensions::CITY_VISITS.to_string(),
                required: 5,
            },
            score_bonus: 50,
        },
        BadgeDefinition {
            id: "local_legend".to_string(),
            name: "Local Legend".to_string(),
            description: "Twenty-five check-ins overall.".to_string(),
            rarity: BadgeRarity::Rare,
            category: BadgeCategory::Exploration,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::TOTAL_CHECK_INS.to_string(),
                required: 25,
            },
            score_bonus: 100,
        },
        BadgeDefinition {
            id: "first_take".to_string(),
            name: "First Take".to_string(),
            description: "Submitted a spot review.".to_string(),
            rarity: BadgeRarity::Common,
            category: BadgeCategory::Content,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::SPOTS_REVIEWED.to_string(),
                required: 1,
            },
            score_bonus: 10,
        },
        BadgeDefinition {
            id: "critic".to_string(),
            name: "Critic".to_string(),
            description: "Ten spot reviews on the books.".to_string(),
            rarity: BadgeRarity::Uncommon,
            category: BadgeCategory::Content,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::SPOTS_REVIEWED.to_string(),
                required: 10,
            },
            score_bonus: 50,
        },
        BadgeDefinition {
            id: "shutterbug".to_string(),
            name: "Shutterbug".to_string(),
            description: "Fifty photos shared.".to_string(),
            rarity: BadgeRarity::Rare,
            category: BadgeCategory::Content,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::PHOTOS_ADDED.to_string(),
                required: 50,
            },
            score_bonus: 75,
        },
        BadgeDefinition {
            id: "first_host".to_string(),
            name: "Opening Night".to_string(),
            description: "Hosted a plan.".to_string(),
            rarity: BadgeRarity::Common,
            category: BadgeCategory::Hosting,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::PLANS_HOSTED.to_string(),
                required: 1,
            },
            score_bonus: 20,
        },
        BadgeDefinition {
            id: "ringleader".to_string(),
            name: "Ringleader".to_string(),
            description: "Hosted five plans.".to_string(),
            rarity: BadgeRarity::Rare,
            category: BadgeCategory::Hosting,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::PLANS_HOSTED.to_string(),
                required: 5,
            },
            score_bonus: 100,
        },
        BadgeDefinition {
            id: "social_butterfly".to_string(),
            name: "Social Butterfly".to_string(),
            description: "Made twenty-five connections.".to_string(),
            rarity: BadgeRarity::Uncommon,
            category: BadgeCategory::Social,
            rule: BadgeRule::CounterAtLeast {
                counter: counters::CONNECTIONS_MADE.to_string(),
                required: 25,
            },
            score_bonus: 50,
        },
        BadgeDefinition {
            id: "reliable_traveler".to_string(),
            name: "Reliable Traveler".to_string(),
            description: "Showed up to at least 90% of joined plans.".to_string(),
            rarity: BadgeRarity::Epic,
            category: BadgeCategory::Social,
            rule: BadgeRule::AttendanceRateAtLeast {
                percent: 90,
                min_joined: 10,
            },
            score_bonus: 150,
        },
        BadgeDefinition {
            id: "week_streak".to_string(),
            name: "Seven Straight".to_string(),
            description: "A full week of daily activity.".to_string(),
            rarity: BadgeRarity::Uncommon,
            category: BadgeCategory::Dedication,
            rule: BadgeRule::StreakAtLeast { days: 7 },
            score_bonus: 40,
        },
        BadgeDefinition {
            id: "month_streak".to_string(),
            name: "Thirty Aloft".to_string(),
            description: "Thirty consecutive days of activity.".to_string(),
            rarity: BadgeRarity::Legendary,
            category: BadgeCategory::Dedication,
            rule: BadgeRule::StreakAtLeast { days: 30 },
            score_bonus: 250,
        },
    ]
}
