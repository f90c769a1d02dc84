/// Ordering contract of the notification queue: within one processed event
/// the sequence is ScoreDelta, Toast, LevelUp, then BadgeUnlocked in catalog
/// order; across events it is processing order; buffering while the sink is
/// absent loses nothing.
use std::sync::{Arc, Mutex};

use layover_engine::config::{EngineConfig, NotificationConfig};
use layover_engine::engine::badges::{BadgeCategory, BadgeDefinition, BadgeRarity, BadgeRule};
use layover_engine::engine::errors::EngineError;
use layover_engine::engine::levels::LevelTier;
use layover_engine::engine::notify::NotificationSink;
use layover_engine::engine::types::{counters, ActivityEvent, ActivityKind, NotificationEvent};
use layover_engine::engine::EngagementEngine;
use layover_engine::storage::StatsStoreBuilder;
use serde_json::json;
use tempfile::TempDir;

fn badge(id: &str, required: u64) -> BadgeDefinition {
    BadgeDefinition {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        rarity: BadgeRarity::Common,
        category: BadgeCategory::Exploration,
        rule: BadgeRule::CounterAtLeast {
            counter: counters::TOTAL_CHECK_INS.to_string(),
            required,
        },
        score_bonus: 0,
    }
}

/// Tiny level ladder and two badges that both unlock on the first check-in,
/// with toasts disabled so the delivered shape matches the contract exactly.
fn setup_engine(max_buffered: Option<usize>) -> (TempDir, EngagementEngine) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(StatsStoreBuilder::new(dir.path()).open().expect("store"));
    let mut config = EngineConfig {
        levels: vec![
            LevelTier::new("rookie", 0, "Rookie", ""),
            LevelTier::new("junior", 10, "Junior", ""),
        ],
        badges: vec![badge("badge_a", 1), badge("badge_b", 1)],
        notifications: NotificationConfig {
            max_buffered_per_user: max_buffered,
        },
        ..EngineConfig::default()
    };
    config.scoring.toasts_enabled = false;
    let engine = EngagementEngine::new(store, config).expect("engine");
    (dir, engine)
}

fn kind_tags(notes: &[NotificationEvent]) -> Vec<String> {
    notes
        .iter()
        .map(|n| match n {
            NotificationEvent::ScoreDelta { .. } => "score".to_string(),
            NotificationEvent::Toast { .. } => "toast".to_string(),
            NotificationEvent::LevelUp { .. } => "level_up".to_string(),
            NotificationEvent::BadgeUnlocked { badge } => format!("badge:{}", badge.id),
        })
        .collect()
}

#[test]
fn level_up_plus_two_badges_arrive_in_fixed_order() {
    let (_dir, engine) = setup_engine(None);
    // One check-in: +25 crosses the 10-point boundary and satisfies both
    // badges at once.
    let event =
        ActivityEvent::new("ava", ActivityKind::CheckIn).with_payload("city", json!("Lisbon"));
    engine.process_event(&event).expect("process");

    let drained = engine.queue().drain("ava");
    assert_eq!(
        kind_tags(&drained),
        vec!["score", "level_up", "badge:badge_a", "badge:badge_b"]
    );
}

#[test]
fn toast_slots_between_score_and_level_up() {
    // Toasts left enabled here, unlike the shared setup.
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(StatsStoreBuilder::new(dir.path()).open().expect("store"));
    let config = EngineConfig {
        levels: vec![
            LevelTier::new("rookie", 0, "Rookie", ""),
            LevelTier::new("junior", 10, "Junior", ""),
        ],
        badges: vec![badge("badge_a", 1)],
        ..EngineConfig::default()
    };
    let engine = EngagementEngine::new(store, config).expect("engine");

    let event =
        ActivityEvent::new("ava", ActivityKind::CheckIn).with_payload("city", json!("Lisbon"));
    engine.process_event(&event).expect("process");
    let drained = engine.queue().drain("ava");
    assert_eq!(
        kind_tags(&drained),
        vec!["score", "toast", "level_up", "badge:badge_a"]
    );
}

#[test]
fn order_across_events_is_processing_order() {
    let (_dir, engine) = setup_engine(None);
    engine
        .process_event(
            &ActivityEvent::new("ava", ActivityKind::CheckIn).with_payload("city", json!("Rome")),
        )
        .expect("first");
    engine
        .process_event(&ActivityEvent::new("ava", ActivityKind::ConnectionMade))
        .expect("second");

    let drained = engine.queue().drain("ava");
    let tags = kind_tags(&drained);
    // First event's burst (score, level_up, badges), then the second's score.
    assert_eq!(tags.last().map(String::as_str), Some("score"));
    assert_eq!(tags[0], "score");
    assert!(tags.contains(&"badge:badge_a".to_string()));
}

struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl NotificationSink for RecordingSink {
    fn on_event(&self, _user_id: &str, event: &NotificationEvent) -> Result<(), EngineError> {
        self.events
            .lock()
            .expect("lock")
            .push(event.clone());
        Ok(())
    }
}

#[test]
fn sink_attached_after_backgrounding_receives_everything_in_order() {
    let (_dir, engine) = setup_engine(None);
    let event =
        ActivityEvent::new("ava", ActivityKind::CheckIn).with_payload("city", json!("Lisbon"));
    engine.process_event(&event).expect("process");
    assert_eq!(engine.queue().pending("ava"), 4);

    let sink = Arc::new(RecordingSink {
        events: Mutex::new(Vec::new()),
    });
    engine.attach_sink(sink.clone());
    let seen = sink.events.lock().expect("lock").clone();
    assert_eq!(
        kind_tags(&seen),
        vec!["score", "level_up", "badge:badge_a", "badge:badge_b"]
    );
    assert_eq!(engine.queue().pending("ava"), 0);
}

#[test]
fn sign_out_drops_pending_events() {
    let (_dir, engine) = setup_engine(None);
    let event =
        ActivityEvent::new("ava", ActivityKind::CheckIn).with_payload("city", json!("Lisbon"));
    engine.process_event(&event).expect("process");
    assert!(engine.queue().pending("ava") > 0);
    engine.sign_out("ava");
    assert_eq!(engine.queue().pending("ava"), 0);
}

#[test]
fn bounded_queue_drops_oldest_never_blocks() {
    let (_dir, engine) = setup_engine(Some(3));
    for i in 0..4 {
        engine
            .process_event(
                &ActivityEvent::new("ava", ActivityKind::ConnectionMade)
                    .with_dedupe_key(&format!("conn-{}", i)),
            )
            .expect("process");
    }
    // Four score events were enqueued into a 3-slot buffer; the oldest went.
    assert_eq!(engine.queue().pending("ava"), 3);
}
