//! # Layover Engine - Engagement and Gamification Core
//!
//! The engagement engine behind the Layover travel community: it ingests
//! discrete user-activity events, maintains cumulative per-user statistics,
//! derives a monotonically increasing score, maps that score to a level
//! tier, evaluates a badge catalog against the statistics, and emits
//! exactly-once unlock notifications to the presentation layer in a stable
//! order.
//!
//! ## Features
//!
//! - **Table-Driven Scoring**: Per-kind base scores and bonuses (long
//!   reviews, first review of a spot, new cities, streak milestones), all
//!   plain configuration.
//! - **Atomic Statistics**: Sled-backed per-field increments; concurrent
//!   deltas never lose an update, and dedupe keys make replays a no-op.
//! - **Pure Level Resolution**: Level-ups are detected by comparing two
//!   resolutions of a validated tier table, never by a fired-once flag.
//! - **Exactly-Once Badges**: Awards go through a compare-and-swap ledger;
//!   score bonuses ride dedupe-keyed deltas, so no error path can pay twice.
//! - **Ordered Notifications**: Per-user FIFO queues that buffer while the
//!   app is backgrounded and flush in order when a sink attaches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use layover_engine::engine::EngagementEngine;
//! use layover_engine::engine::types::{ActivityEvent, ActivityKind};
//! use layover_engine::storage::StatsStore;
//!
//! fn main() -> Result<(), layover_engine::engine::errors::EngineError> {
//!     let store = Arc::new(StatsStore::open("./data/engagement")?);
//!     let engine = EngagementEngine::with_defaults(store)?;
//!
//!     let event = ActivityEvent::new("ava", ActivityKind::CheckIn)
//!         .with_payload("city", serde_json::json!("Lisbon"))
//!         .with_generated_dedupe_key();
//!     let outcome = engine.process_event(&event)?;
//!     println!("score is now {}", outcome.stats.score);
//!
//!     for note in engine.queue().drain("ava") {
//!         println!("{:?}", note);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The event pipeline: calculator, level resolver, badge
//!   evaluator, achievement ledger, and notification queue
//! - [`storage`] - Sled persistence for statistics, dedupe keys, and the
//!   ledger
//! - [`config`] - TOML configuration: scoring table, level ladder, badge
//!   catalog
//! - [`metrics`] - Process-wide counters
//! - [`logutil`] - Log sanitization helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │  Score Calculator │ ← event → stats delta + score delta
//! └───────────────────┘
//!           │
//! ┌───────────────────┐
//! │    Stats Store    │ ← atomic apply, dedupe replay guard
//! └───────────────────┘
//!           │
//! ┌───────────────────┐
//! │ Levels · Badges · │ ← pure resolution + CAS ledger
//! │      Ledger       │
//! └───────────────────┘
//!           │
//! ┌───────────────────┐
//! │ Notification Queue│ ← ordered, per-user delivery to the UI sink
//! └───────────────────┘
//! ```
//!
//! The engine performs no network calls, owns no UI, and imposes no
//! scheduling model: hosts serialize events per user and attach a
//! [`engine::notify::NotificationSink`] when the UI is ready to celebrate.

pub mod config;
pub mod engine;
pub mod logutil;
pub mod metrics;
pub mod storage;
