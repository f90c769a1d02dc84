use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::engine::errors::EngineError;
use crate::engine::levels::LevelTier;

pub const STATS_SCHEMA_VERSION: u8 = 1;
pub const ACHIEVEMENT_SCHEMA_VERSION: u8 = 1;

/// Canonical counter names tracked in [`UserStatistics::counters`].
pub mod counters {
    pub const TOTAL_CHECK_INS: &str = "total_check_ins";
    pub const SPOTS_REVIEWED: &str = "spots_reviewed";
    pub const PLANS_HOSTED: &str = "plans_hosted";
    pub const PLANS_ATTENDED: &str = "plans_attended";
    pub const PLANS_JOINED: &str = "plans_joined";
    pub const CONNECTIONS_MADE: &str = "connections_made";
    pub const PHOTOS_ADDED: &str = "photos_added";
    pub const STREAK_TICKS: &str = "streak_ticks";
}

/// Canonical per-category dimensions tracked in [`UserStatistics::per_category`].
pub mod dimensions {
    pub const CITY_VISITS: &str = "city_visits";
    pub const SPOT_REVIEWS: &str = "spot_reviews";
}

/// Closed enumeration of activity the engine knows how to score. Unknown kind
/// strings are rejected at the ingestion boundary, never silently ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CheckIn,
    ReviewSubmitted,
    PlanHosted,
    PlanAttended,
    ConnectionMade,
    PhotoAdded,
    StreakTick,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CheckIn => "check_in",
            ActivityKind::ReviewSubmitted => "review_submitted",
            ActivityKind::PlanHosted => "plan_hosted",
            ActivityKind::PlanAttended => "plan_attended",
            ActivityKind::ConnectionMade => "connection_made",
            ActivityKind::PhotoAdded => "photo_added",
            ActivityKind::StreakTick => "streak_tick",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_in" => Ok(ActivityKind::CheckIn),
            "review_submitted" => Ok(ActivityKind::ReviewSubmitted),
            "plan_hosted" => Ok(ActivityKind::PlanHosted),
            "plan_attended" => Ok(ActivityKind::PlanAttended),
            "connection_made" => Ok(ActivityKind::ConnectionMade),
            "photo_added" => Ok(ActivityKind::PhotoAdded),
            "streak_tick" => Ok(ActivityKind::StreakTick),
            other => Err(EngineError::InvalidEvent(format!(
                "unknown activity kind: {}",
                other
            ))),
        }
    }
}

/// One discrete user action handed to the engine by the host application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEvent {
    pub user_id: String,
    pub kind: ActivityKind,
    /// Kind-specific detail (city, spot id, review text, ...).
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    /// When present, re-applying the identical event is a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
}

impl ActivityEvent {
    pub fn new(user_id: &str, kind: ActivityKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            payload: HashMap::new(),
            occurred_at: Utc::now(),
            dedupe_key: None,
        }
    }

    pub fn with_payload(mut self, key: &str, value: serde_json::Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn with_dedupe_key(mut self, key: &str) -> Self {
        self.dedupe_key = Some(key.to_string());
        self
    }

    /// Attach a fresh v4 UUID dedupe key. Callers that cannot derive a stable
    /// key from their own domain should use this before first submission.
    pub fn with_generated_dedupe_key(mut self) -> Self {
        self.dedupe_key = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    /// Fetch a required string field from the payload.
    pub fn payload_str(&self, key: &str) -> Result<&str, EngineError> {
        self.payload
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                EngineError::InvalidEvent(format!(
                    "{} event missing string payload field '{}'",
                    self.kind, key
                ))
            })
    }
}

/// Rolling streak values carried by a delta. These replace the stored values
/// rather than incrementing them: a streak can reset to zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current_days: u32,
    pub longest_days: u32,
}

/// The set of mutations one processed event applies to a user's statistics.
///
/// Counter values are signed so administrative corrections can subtract;
/// the score calculator itself only ever emits non-negative values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatisticsDelta {
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub per_category: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakUpdate>,
    #[serde(default)]
    pub score_delta: i64,
}

impl StatisticsDelta {
    pub fn increment(mut self, counter: &str, by: i64) -> Self {
        *self.counters.entry(counter.to_string()).or_insert(0) += by;
        self
    }

    pub fn increment_category(mut self, dimension: &str, key: &str, by: i64) -> Self {
        *self
            .per_category
            .entry(dimension.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0) += by;
        self
    }

    pub fn with_streak(mut self, current_days: u32, longest_days: u32) -> Self {
        self.streak = Some(StreakUpdate {
            current_days,
            longest_days,
        });
        self
    }

    pub fn with_score(mut self, score_delta: i64) -> Self {
        self.score_delta = score_delta;
        self
    }

    /// A score-only delta, used for badge bonuses and admin corrections.
    pub fn score_only(score_delta: i64) -> Self {
        Self::default().with_score(score_delta)
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.per_category.is_empty()
            && self.streak.is_none()
            && self.score_delta == 0
    }
}

/// Durable per-user statistics document. Created with all-zero defaults at
/// first touch and mutated only through `StatsStore::apply_delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStatistics {
    pub user_id: String,
    /// Cumulative engagement score; monotonically non-decreasing except for
    /// administrative corrections.
    pub score: u64,
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
    #[serde(default)]
    pub per_category: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    pub current_streak_days: u32,
    #[serde(default)]
    pub longest_streak_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl UserStatistics {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            score: 0,
            counters: BTreeMap::new(),
            per_category: BTreeMap::new(),
            current_streak_days: 0,
            longest_streak_days: 0,
            created_at: now,
            updated_at: now,
            schema_version: STATS_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn category_count(&self, dimension: &str, key: &str) -> u64 {
        self.per_category
            .get(dimension)
            .and_then(|m| m.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct keys seen under a dimension (e.g. cities visited).
    pub fn distinct_categories(&self, dimension: &str) -> usize {
        self.per_category
            .get(dimension)
            .map(|m| m.values().filter(|v| **v > 0).count())
            .unwrap_or(0)
    }

    /// Plans attended over plans joined, in `[0,1]`. `None` until the user
    /// has joined at least one plan.
    pub fn attendance_rate(&self) -> Option<f64> {
        let joined = self.counter(counters::PLANS_JOINED);
        if joined == 0 {
            return None;
        }
        let attended = self.counter(counters::PLANS_ATTENDED).min(joined);
        Some(attended as f64 / joined as f64)
    }

    /// Apply a delta in place. Rejects any mutation that would drive a
    /// counter or the score below zero; on error the document is unchanged.
    pub fn apply(&mut self, delta: &StatisticsDelta) -> Result<(), EngineError> {
        // Validate everything before mutating anything.
        for (name, change) in &delta.counters {
            let current = self.counter(name) as i64;
            if current + change < 0 {
                return Err(EngineError::InvariantViolation(format!(
                    "counter '{}' would become negative ({} {:+})",
                    name, current, change
                )));
            }
        }
        for (dimension, entries) in &delta.per_category {
            for (key, change) in entries {
                let current = self.category_count(dimension, key) as i64;
                if current + change < 0 {
                    return Err(EngineError::InvariantViolation(format!(
                        "category counter '{}:{}' would become negative",
                        dimension, key
                    )));
                }
            }
        }
        if (self.score as i64) + delta.score_delta < 0 {
            return Err(EngineError::InvariantViolation(format!(
                "score would become negative ({} {:+})",
                self.score, delta.score_delta
            )));
        }

        for (name, change) in &delta.counters {
            let entry = self.counters.entry(name.clone()).or_insert(0);
            *entry = (*entry as i64 + change) as u64;
        }
        for (dimension, entries) in &delta.per_category {
            let dim = self.per_category.entry(dimension.clone()).or_default();
            for (key, change) in entries {
                let entry = dim.entry(key.clone()).or_insert(0);
                *entry = (*entry as i64 + change) as u64;
            }
        }
        if let Some(streak) = delta.streak {
            self.current_streak_days = streak.current_days;
            self.longest_streak_days = self.longest_streak_days.max(streak.longest_days);
        }
        self.score = (self.score as i64 + delta.score_delta) as u64;
        self.touch();
        Ok(())
    }
}

/// One earned badge. Existence of the row is the sole idempotency guard
/// against double-award.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub user_id: String,
    pub badge_id: String,
    pub earned_at: DateTime<Utc>,
    pub notified: bool,
    pub schema_version: u8,
}

impl Achievement {
    pub fn new(user_id: &str, badge_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            badge_id: badge_id.to_string(),
            earned_at: Utc::now(),
            notified: false,
            schema_version: ACHIEVEMENT_SCHEMA_VERSION,
        }
    }
}

/// Compact badge shape carried inside notifications so the UI never has to
/// consult the catalog to render an unlock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BadgeSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: crate::engine::badges::BadgeRarity,
}

/// UI-facing celebration events, delivered per-user in FIFO order. Within a
/// single processed activity event the order is fixed: ScoreDelta, Toast,
/// LevelUp, then BadgeUnlocked in catalog-declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NotificationEvent {
    ScoreDelta { amount: u64, total: u64 },
    Toast { message: String },
    LevelUp { from: LevelTier, to: LevelTier },
    BadgeUnlocked { badge: BadgeSummary },
}
