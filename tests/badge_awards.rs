/// At-most-one badge award per (user, badge) pair, catalog growth without
/// migration, streak badges that stop matching, and progress reporting.
use std::sync::Arc;

use layover_engine::config::EngineConfig;
use layover_engine::engine::badges::{BadgeCategory, BadgeDefinition, BadgeRarity, BadgeRule};
use layover_engine::engine::types::{counters, ActivityEvent, ActivityKind};
use layover_engine::engine::EngagementEngine;
use layover_engine::storage::{StatsStore, StatsStoreBuilder};
use serde_json::json;
use tempfile::TempDir;

fn setup_store() -> (TempDir, Arc<StatsStore>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(StatsStoreBuilder::new(dir.path()).open().expect("store"));
    (dir, store)
}

fn check_in(user: &str, city: &str, key: &str) -> ActivityEvent {
    ActivityEvent::new(user, ActivityKind::CheckIn)
        .with_payload("city", json!(city))
        .with_dedupe_key(key)
}

#[test]
fn first_layover_unlocks_exactly_once() {
    let (_dir, store) = setup_store();
    let engine = EngagementEngine::with_defaults(store).expect("engine");

    let outcome = engine
        .process_event(&check_in("ava", "Lisbon", "evt-1"))
        .expect("first");
    assert!(outcome.new_badges.contains(&"first_layover".to_string()));

    // Statistics keep satisfying the predicate forever; the badge is never
    // "new" again.
    for i in 2..6 {
        let outcome = engine
            .process_event(&check_in("ava", "Lisbon", &format!("evt-{}", i)))
            .expect("more");
        assert!(!outcome.new_badges.contains(&"first_layover".to_string()));
    }
    let rows = engine.earned_badges("ava").expect("rows");
    let layovers: Vec<_> = rows
        .iter()
        .filter(|(def, _)| def.id == "first_layover")
        .collect();
    assert_eq!(layovers.len(), 1);
    assert!(layovers[0].1.notified);
}

#[test]
fn bonus_is_paid_exactly_once() {
    let (_dir, store) = setup_store();
    let engine = EngagementEngine::with_defaults(Arc::clone(&store)).expect("engine");

    let outcome = engine
        .process_event(&check_in("ava", "Lisbon", "evt-1"))
        .expect("process");
    // 10 base + 15 new city + 10 first_layover bonus.
    assert_eq!(outcome.stats.score, 35);

    // Redundant settles re-run the evaluator but the ledger gate holds.
    for _ in 0..3 {
        engine.resume_after_apply("ava", 0).expect("resume");
    }
    assert_eq!(engine.stats("ava").expect("stats").score, 35);
}

#[test]
fn catalog_additions_need_no_migration() {
    let (_dir, store) = setup_store();
    {
        let engine = EngagementEngine::with_defaults(Arc::clone(&store)).expect("engine");
        engine
            .process_event(&check_in("ava", "Lisbon", "evt-1"))
            .expect("process");
    }

    // A later deploy ships one more badge. Existing statistics already
    // satisfy it; it unlocks on the very next event.
    let mut config = EngineConfig::default();
    config.badges.push(BadgeDefinition {
        id: "early_adopter".to_string(),
        name: "Early Adopter".to_string(),
        description: "Was here before this badge existed.".to_string(),
        rarity: BadgeRarity::Rare,
        category: BadgeCategory::Dedication,
        rule: BadgeRule::CounterAtLeast {
            counter: counters::TOTAL_CHECK_INS.to_string(),
            required: 1,
        },
        score_bonus: 0,
    });
    let engine = EngagementEngine::new(Arc::clone(&store), config).expect("engine");
    let outcome = engine
        .process_event(&check_in("ava", "Porto", "evt-2"))
        .expect("process");
    assert!(outcome.new_badges.contains(&"early_adopter".to_string()));
}

#[test]
fn streak_badge_can_stop_matching_but_stays_earned() {
    let (_dir, store) = setup_store();
    let engine = EngagementEngine::with_defaults(store).expect("engine");

    let tick = |days: u64, key: &str| {
        ActivityEvent::new("ava", ActivityKind::StreakTick)
            .with_payload("current_streak_days", json!(days))
            .with_dedupe_key(key)
    };

    let outcome = engine.process_event(&tick(7, "tick-7")).expect("week");
    assert!(outcome.new_badges.contains(&"week_streak".to_string()));

    // Streak resets; the rule stops matching but the row is permanent.
    engine.process_event(&tick(0, "tick-reset")).expect("reset");
    let rows = engine.earned_badges("ava").expect("rows");
    assert!(rows.iter().any(|(def, _)| def.id == "week_streak"));

    let progress = engine.badge_progress("ava").expect("progress");
    let week = progress
        .iter()
        .find(|p| p.badge.id == "week_streak")
        .expect("week entry");
    assert!(week.earned);
    assert!((week.progress - 1.0).abs() < f64::EPSILON);
    let month = progress
        .iter()
        .find(|p| p.badge.id == "month_streak")
        .expect("month entry");
    assert!(!month.earned);
    assert!(month.progress < f64::EPSILON);
}

#[test]
fn progress_tracks_partial_requirements() {
    let (_dir, store) = setup_store();
    let engine = EngagementEngine::with_defaults(store).expect("engine");

    for (i, city) in ["Lisbon", "Porto"].iter().enumerate() {
        engine
            .process_event(&check_in("ava", city, &format!("evt-{}", i)))
            .expect("process");
    }
    let progress = engine.badge_progress("ava").expect("progress");
    let hopper = progress
        .iter()
        .find(|p| p.badge.id == "city_hopper")
        .expect("city_hopper entry");
    assert!(!hopper.earned);
    // 2 of 5 cities.
    assert!((hopper.progress - 0.4).abs() < 1e-9);
}

#[test]
fn admin_reset_allows_reearning() {
    let (_dir, store) = setup_store();
    let engine = EngagementEngine::with_defaults(store).expect("engine");

    engine
        .process_event(&check_in("ava", "Lisbon", "evt-1"))
        .expect("process");
    assert_eq!(engine.admin_reset_achievements("ava").expect("reset"), 1);
    assert!(engine.earned_badges("ava").expect("rows").is_empty());

    let outcome = engine
        .process_event(&check_in("ava", "Porto", "evt-2"))
        .expect("process");
    assert!(outcome.new_badges.contains(&"first_layover".to_string()));
}
