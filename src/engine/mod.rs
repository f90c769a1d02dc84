//! # Engagement Engine Core
//!
//! The pipeline that turns one activity event into statistics, level, badge,
//! and notification state:
//!
//! ```text
//! activity event
//!   → score calculator   (stats delta + score delta)
//!   → stats store        (atomic apply, dedupe)
//!   → level resolver     (old tier vs new tier)
//!   → badge evaluator    (catalog vs updated stats)
//!   → achievement ledger (filter to unearned, apply bonuses)
//!   → notification queue (fixed-priority enqueue)
//! ```
//!
//! The pipeline runs as one logical unit of work per event. If any stage
//! after the stats store fails, the statistics update is not rolled back:
//! the host retries from the level resolver step via
//! [`EngagementEngine::resume_after_apply`] using the already-updated
//! statistics, never by re-applying the delta.

pub mod badges;
pub mod errors;
pub mod ledger;
pub mod levels;
pub mod notify;
pub mod score;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::StatsStore;

use badges::{BadgeCatalog, BadgeDefinition};
use errors::EngineError;
use ledger::AchievementLedger;
use levels::{LevelTable, LevelTier};
use notify::{NotificationQueue, NotificationSink};
use score::{ScoreCalculator, ScoringConfig};
use types::{Achievement, ActivityEvent, NotificationEvent, StatisticsDelta, UserStatistics};

/// What one processed event did, for hosts that want to inspect the result
/// without wiring a sink.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Statistics after the event (and any badge bonuses).
    pub stats: UserStatistics,
    /// Notifications enqueued for this event, in delivery order.
    pub notifications: Vec<NotificationEvent>,
    /// True when the dedupe key had already been recorded and nothing changed.
    pub deduped: bool,
    /// Badge ids newly placed on the ledger by this event.
    pub new_badges: Vec<String>,
    pub level_up: Option<(LevelTier, LevelTier)>,
}

/// Progress toward one badge, for rendering progress bars. Computation never
/// affects award logic.
#[derive(Debug, Clone)]
pub struct BadgeProgress {
    pub badge: BadgeDefinition,
    /// Fraction of the requirement met, in `[0,1]`.
    pub progress: f64,
    pub earned: bool,
}

/// The engine proper: a `user_id`-scoped handle over the stats store, the
/// static catalog/table configuration, and the notification queue. No
/// process-wide singleton; hosts construct one and share it.
pub struct EngagementEngine {
    store: Arc<StatsStore>,
    ledger: AchievementLedger,
    calculator: ScoreCalculator,
    levels: LevelTable,
    catalog: BadgeCatalog,
    queue: NotificationQueue,
}

impl EngagementEngine {
    /// Build an engine from a store and validated configuration.
    pub fn new(store: Arc<StatsStore>, config: EngineConfig) -> Result<Self, EngineError> {
        let levels = LevelTable::new(config.levels)?;
        let catalog = BadgeCatalog::new(config.badges)?;
        let ledger = AchievementLedger::new(&store);
        Ok(Self {
            store,
            ledger,
            calculator: ScoreCalculator::new(config.scoring),
            levels,
            catalog,
            queue: NotificationQueue::new(config.notifications.max_buffered_per_user),
        })
    }

    /// Engine with default scoring, levels, and badge catalog.
    pub fn with_defaults(store: Arc<StatsStore>) -> Result<Self, EngineError> {
        Self::new(store, EngineConfig::default())
    }

    pub fn scoring(&self) -> &ScoringConfig {
        self.calculator.config()
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn catalog(&self) -> &BadgeCatalog {
        &self.catalog
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    pub fn attach_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.queue.attach_sink(sink);
    }

    /// Run the full pipeline for one event.
    ///
    /// Events for the same user must be serialized by the host; the store's
    /// transactional apply still guarantees no lost increments if they race.
    pub fn process_event(&self, event: &ActivityEvent) -> Result<ProcessOutcome, EngineError> {
        let pre = self.store.read(&event.user_id)?;
        let outcome = match self.calculator.compute(event, &pre) {
            Ok(outcome) => outcome,
            Err(e @ EngineError::InvalidEvent(_)) => {
                metrics::inc_events_rejected();
                warn!(
                    "rejected {} event for {}: {} (payload: {})",
                    event.kind,
                    event.user_id,
                    e,
                    escape_log(&format!("{:?}", event.payload))
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let (stats, applied) =
            self.store
                .apply_delta(&event.user_id, &outcome.delta, event.dedupe_key.as_deref())?;
        if !applied {
            metrics::inc_events_deduped();
            debug!(
                "{} event for {} replayed (dedupe key {:?}); no-op",
                event.kind, event.user_id, event.dedupe_key
            );
            return Ok(ProcessOutcome {
                stats,
                notifications: Vec::new(),
                deduped: true,
                new_badges: Vec::new(),
                level_up: None,
            });
        }
        metrics::inc_events_processed();

        self.settle(&event.user_id, pre.score, outcome.toast, stats)
    }

    /// Re-run the stages after the stats store for an event whose delta was
    /// already durably applied: level resolution, badge evaluation, ledger,
    /// and notification enqueue. `pre_event_score` is the score before the
    /// event's delta landed. The delta itself is never re-applied here.
    pub fn resume_after_apply(
        &self,
        user_id: &str,
        pre_event_score: u64,
    ) -> Result<ProcessOutcome, EngineError> {
        let stats = self.store.read(user_id)?;
        self.settle(user_id, pre_event_score, None, stats)
    }

    fn settle(
        &self,
        user_id: &str,
        pre_event_score: u64,
        toast: Option<String>,
        stats: UserStatistics,
    ) -> Result<ProcessOutcome, EngineError> {
        // Badge evaluation runs against post-delta statistics. Awards are
        // ledger-gated, so a redundant settle cannot double-unlock, and the
        // score bonus rides a dedupe-keyed apply so it cannot double-pay.
        let earned = self.ledger.earned_ids(user_id)?;
        let newly: Vec<BadgeDefinition> = self
            .catalog
            .evaluate(&stats, &earned)
            .into_iter()
            .cloned()
            .collect();

        let mut final_stats = stats;
        let mut unlocked: Vec<BadgeDefinition> = Vec::new();
        for badge in newly {
            if self.ledger.award(user_id, &badge.id)? {
                if badge.score_bonus > 0 {
                    let token = format!("badge-bonus:{}", badge.id);
                    let (updated, _) = self.store.apply_delta(
                        user_id,
                        &StatisticsDelta::score_only(badge.score_bonus as i64),
                        Some(&token),
                    )?;
                    final_stats = updated;
                }
                unlocked.push(badge);
            }
        }

        let level_up = self.levels.level_up(pre_event_score, final_stats.score);
        if level_up.is_some() {
            metrics::inc_level_ups();
        }

        let gained = final_stats.score.saturating_sub(pre_event_score);
        let mut notifications = Vec::new();
        if gained > 0 {
            notifications.push(NotificationEvent::ScoreDelta {
                amount: gained,
                total: final_stats.score,
            });
        }
        if let Some(message) = toast {
            notifications.push(NotificationEvent::Toast { message });
        }
        if let Some((from, to)) = &level_up {
            notifications.push(NotificationEvent::LevelUp {
                from: from.clone(),
                to: to.clone(),
            });
        }
        for badge in &unlocked {
            notifications.push(NotificationEvent::BadgeUnlocked {
                badge: badge.summary(),
            });
        }

        for event in &notifications {
            self.queue.enqueue(user_id, event.clone());
        }
        for badge in &unlocked {
            self.ledger.mark_notified(user_id, &badge.id)?;
        }

        Ok(ProcessOutcome {
            stats: final_stats,
            notifications,
            deduped: false,
            new_badges: unlocked.into_iter().map(|b| b.id).collect(),
            level_up,
        })
    }

    /// Current statistics snapshot for a user.
    pub fn stats(&self, user_id: &str) -> Result<UserStatistics, EngineError> {
        self.store.read(user_id)
    }

    /// Current level tier for a user.
    pub fn level(&self, user_id: &str) -> Result<LevelTier, EngineError> {
        Ok(self.levels.resolve(self.store.read(user_id)?.score).clone())
    }

    /// Achievement rows joined with their catalog definitions. Rows whose
    /// badge has since left the catalog are skipped.
    pub fn earned_badges(
        &self,
        user_id: &str,
    ) -> Result<Vec<(BadgeDefinition, Achievement)>, EngineError> {
        let defs: HashMap<&str, &BadgeDefinition> = self
            .catalog
            .badges()
            .iter()
            .map(|b| (b.id.as_str(), b))
            .collect();
        Ok(self
            .ledger
            .list_earned(user_id)?
            .into_iter()
            .filter_map(|row| defs.get(row.badge_id.as_str()).map(|def| ((*def).clone(), row)))
            .collect())
    }

    /// Progress toward every catalog badge, in declaration order.
    pub fn badge_progress(&self, user_id: &str) -> Result<Vec<BadgeProgress>, EngineError> {
        let stats = self.store.read(user_id)?;
        let earned = self.ledger.earned_ids(user_id)?;
        Ok(self
            .catalog
            .badges()
            .iter()
            .map(|badge| BadgeProgress {
                progress: if earned.contains(&badge.id) {
                    1.0
                } else {
                    badge.progress(&stats)
                },
                earned: earned.contains(&badge.id),
                badge: badge.clone(),
            })
            .collect())
    }

    /// Administrative score correction; the only sanctioned way score can
    /// decrease.
    pub fn admin_adjust_score(
        &self,
        user_id: &str,
        adjustment: i64,
    ) -> Result<UserStatistics, EngineError> {
        self.store.admin_adjust_score(user_id, adjustment)
    }

    /// Administrative achievement reset for a user.
    pub fn admin_reset_achievements(&self, user_id: &str) -> Result<usize, EngineError> {
        self.ledger.reset_user(user_id)
    }

    /// Discard any pending notifications on sign-out.
    pub fn sign_out(&self, user_id: &str) {
        self.queue.drop_user(user_id);
    }
}
