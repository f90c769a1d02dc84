//! Table-driven score calculation.
//!
//! Converts one [`ActivityEvent`] plus the user's current statistics into a
//! [`StatisticsDelta`] and an optional toast message. Pure: the calculator
//! never touches the ledger or the level table, and it is safe to call
//! repeatedly for the same logical event as long as the dedupe key guards the
//! apply step upstream.

use serde::{Deserialize, Serialize};

use crate::engine::errors::EngineError;
use crate::engine::types::{counters, dimensions, ActivityEvent, ActivityKind, StatisticsDelta};
use crate::engine::types::UserStatistics;

/// Per-kind base scores and bonus thresholds. All values are plain
/// configuration with defaults; none of them are product-blessed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default = "default_check_in_base")]
    pub check_in_base: u64,
    /// Extra points the first time a city appears in the user's history.
    #[serde(default = "default_new_city_bonus")]
    pub new_city_bonus: u64,
    #[serde(default = "default_review_base")]
    pub review_base: u64,
    /// Review text length (chars) above which the length bonus applies.
    #[serde(default = "default_review_length_threshold")]
    pub review_length_threshold: usize,
    #[serde(default = "default_review_length_bonus")]
    pub review_length_bonus: u64,
    /// Extra points for the first review of a spot by this user.
    #[serde(default = "default_first_review_bonus")]
    pub first_review_bonus: u64,
    #[serde(default = "default_plan_hosted_base")]
    pub plan_hosted_base: u64,
    #[serde(default = "default_plan_attended_base")]
    pub plan_attended_base: u64,
    #[serde(default = "default_connection_base")]
    pub connection_base: u64,
    #[serde(default = "default_photo_base")]
    pub photo_base: u64,
    /// Largest accepted `count` for a single photo_added event.
    #[serde(default = "default_photo_batch_max")]
    pub photo_batch_max: u64,
    #[serde(default = "default_streak_tick_base")]
    pub streak_tick_base: u64,
    /// Every N consecutive days the streak tick pays a milestone bonus.
    #[serde(default = "default_streak_milestone_interval")]
    pub streak_milestone_interval: u32,
    #[serde(default = "default_streak_milestone_bonus")]
    pub streak_milestone_bonus: u64,
    /// Emit toast messages alongside score deltas.
    #[serde(default = "default_toasts_enabled")]
    pub toasts_enabled: bool,
}

fn default_check_in_base() -> u64 {
    10
}
fn default_new_city_bonus() -> u64 {
    15
}
fn default_review_base() -> u64 {
    25
}
fn default_review_length_threshold() -> usize {
    200
}
fn default_review_length_bonus() -> u64 {
    10
}
fn default_first_review_bonus() -> u64 {
    15
}
fn default_plan_hosted_base() -> u64 {
    40
}
fn default_plan_attended_base() -> u64 {
    20
}
fn default_connection_base() -> u64 {
    5
}
fn default_photo_base() -> u64 {
    5
}
fn default_photo_batch_max() -> u64 {
    100
}
fn default_streak_tick_base() -> u64 {
    5
}
fn default_streak_milestone_interval() -> u32 {
    7
}
fn default_streak_milestone_bonus() -> u64 {
    25
}
fn default_toasts_enabled() -> bool {
    true
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            check_in_base: default_check_in_base(),
            new_city_bonus: default_new_city_bonus(),
            review_base: default_review_base(),
            review_length_threshold: default_review_length_threshold(),
            review_length_bonus: default_review_length_bonus(),
            first_review_bonus: default_first_review_bonus(),
            plan_hosted_base: default_plan_hosted_base(),
            plan_attended_base: default_plan_attended_base(),
            connection_base: default_connection_base(),
            photo_base: default_photo_base(),
            photo_batch_max: default_photo_batch_max(),
            streak_tick_base: default_streak_tick_base(),
            streak_milestone_interval: default_streak_milestone_interval(),
            streak_milestone_bonus: default_streak_milestone_bonus(),
            toasts_enabled: default_toasts_enabled(),
        }
    }
}

/// Output of the calculator: the delta to apply plus an optional toast.
#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub delta: StatisticsDelta,
    pub toast: Option<String>,
}

pub struct ScoreCalculator {
    config: ScoringConfig,
}

impl ScoreCalculator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Map an event onto a statistics delta and score gain. Rejects
    /// malformed payloads before any mutation happens downstream.
    pub fn compute(
        &self,
        event: &ActivityEvent,
        stats: &UserStatistics,
    ) -> Result<EventOutcome, EngineError> {
        let cfg = &self.config;
        let (delta, toast) = match event.kind {
            ActivityKind::CheckIn => {
                let city = event.payload_str("city")?;
                // Normalized key for the stats dimension, original casing
                // for display.
                let city_key = city.to_lowercase();
                let mut score = cfg.check_in_base;
                let first_visit = stats.category_count(dimensions::CITY_VISITS, &city_key) == 0;
                if first_visit {
                    score += cfg.new_city_bonus;
                }
                let delta = StatisticsDelta::default()
                    .increment(counters::TOTAL_CHECK_INS, 1)
                    .increment_category(dimensions::CITY_VISITS, &city_key, 1)
                    .with_score(score as i64);
                let toast = if first_visit {
                    format!("New city unlocked: {}! +{} pts", city, score)
                } else {
                    format!("Checked in! +{} pts", score)
                };
                (delta, toast)
            }
            ActivityKind::ReviewSubmitted => {
                let spot_id = event.payload_str("spot_id")?.to_string();
                let text_len = event
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|t| t.chars().count())
                    .unwrap_or(0);
                let mut score = cfg.review_base;
                if text_len > cfg.review_length_threshold {
                    score += cfg.review_length_bonus;
                }
                if stats.category_count(dimensions::SPOT_REVIEWS, &spot_id) == 0 {
                    score += cfg.first_review_bonus;
                }
                let delta = StatisticsDelta::default()
                    .increment(counters::SPOTS_REVIEWED, 1)
                    .increment_category(dimensions::SPOT_REVIEWS, &spot_id, 1)
                    .with_score(score as i64);
                (delta, format!("Review posted! +{} pts", score))
            }
            ActivityKind::PlanHosted => {
                let delta = StatisticsDelta::default()
                    .increment(counters::PLANS_HOSTED, 1)
                    .with_score(cfg.plan_hosted_base as i64);
                (
                    delta,
                    format!("Thanks for hosting! +{} pts", cfg.plan_hosted_base),
                )
            }
            ActivityKind::PlanAttended => {
                // A concluded plan for this user. `attended: false` records a
                // no-show, which feeds the attendance rate but scores nothing.
                let attended = match event.payload.get("attended") {
                    None => true,
                    Some(v) => v.as_bool().ok_or_else(|| {
                        EngineError::InvalidEvent(
                            "plan_attended payload field 'attended' must be a bool".to_string(),
                        )
                    })?,
                };
                let mut delta =
                    StatisticsDelta::default().increment(counters::PLANS_JOINED, 1);
                if attended {
                    delta = delta
                        .increment(counters::PLANS_ATTENDED, 1)
                        .with_score(cfg.plan_attended_base as i64);
                }
                let toast = if attended {
                    format!("Plan attended! +{} pts", cfg.plan_attended_base)
                } else {
                    String::new()
                };
                (delta, toast)
            }
            ActivityKind::ConnectionMade => {
                let delta = StatisticsDelta::default()
                    .increment(counters::CONNECTIONS_MADE, 1)
                    .with_score(cfg.connection_base as i64);
                (
                    delta,
                    format!("New connection! +{} pts", cfg.connection_base),
                )
            }
            ActivityKind::PhotoAdded => {
                let count = match event.payload.get("count") {
                    None => 1,
                    Some(v) => {
                        let n = v.as_u64().ok_or_else(|| {
                            EngineError::InvalidEvent(
                                "photo_added payload field 'count' must be a positive integer"
                                    .to_string(),
                            )
                        })?;
                        if n == 0 {
                            return Err(EngineError::InvalidEvent(
                                "photo_added payload field 'count' must be at least 1".to_string(),
                            ));
                        }
                        if n > cfg.photo_batch_max {
                            return Err(EngineError::InvalidEvent(format!(
                                "photo_added payload field 'count' exceeds batch limit of {}",
                                cfg.photo_batch_max
                            )));
                        }
                        n
                    }
                };
                let score = cfg.photo_base * count;
                let delta = StatisticsDelta::default()
                    .increment(counters::PHOTOS_ADDED, count as i64)
                    .with_score(score as i64);
                (delta, format!("Photos shared! +{} pts", score))
            }
            ActivityKind::StreakTick => {
                let current = event
                    .payload
                    .get("current_streak_days")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        EngineError::InvalidEvent(
                            "streak_tick payload requires integer field 'current_streak_days'"
                                .to_string(),
                        )
                    })?;
                let current = u32::try_from(current).map_err(|_| {
                    EngineError::InvalidEvent(
                        "streak_tick payload field 'current_streak_days' is out of range"
                            .to_string(),
                    )
                })?;
                let mut score = cfg.streak_tick_base;
                let milestone = cfg.streak_milestone_interval > 0
                    && current > 0
                    && current % cfg.streak_milestone_interval == 0;
                if milestone {
                    score += cfg.streak_milestone_bonus;
                }
                let longest = stats.longest_streak_days.max(current);
                let delta = StatisticsDelta::default()
                    .increment(counters::STREAK_TICKS, 1)
                    .with_streak(current, longest)
                    .with_score(score as i64);
                let toast = if milestone {
                    format!("{}-day streak! +{} pts", current, score)
                } else {
                    format!("Streak day {}. +{} pts", current, score)
                };
                (delta, toast)
            }
        };

        let toast = if self.config.toasts_enabled && !toast.is_empty() {
            Some(toast)
        } else {
            None
        };
        Ok(EventOutcome { delta, toast })
    }
}
