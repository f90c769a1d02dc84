//! Process-wide engagement counters. Cheap atomics; a snapshot accessor for
//! hosts that export them.

use std::sync::atomic::{AtomicU64, Ordering};

static EVENTS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static EVENTS_DEDUPED: AtomicU64 = AtomicU64::new(0);
static EVENTS_REJECTED: AtomicU64 = AtomicU64::new(0);
static BADGES_AWARDED: AtomicU64 = AtomicU64::new(0);
static LEVEL_UPS: AtomicU64 = AtomicU64::new(0);
static NOTIFICATIONS_BUFFERED: AtomicU64 = AtomicU64::new(0);
static NOTIFICATIONS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static NOTIFICATIONS_DROPPED: AtomicU64 = AtomicU64::new(0);

pub fn inc_events_processed() {
    EVENTS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_events_deduped() {
    EVENTS_DEDUPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_events_rejected() {
    EVENTS_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_badges_awarded() {
    BADGES_AWARDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_level_ups() {
    LEVEL_UPS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_notifications_buffered() {
    NOTIFICATIONS_BUFFERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_notifications_delivered() {
    NOTIFICATIONS_DELIVERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_notifications_dropped() {
    NOTIFICATIONS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub events_deduped: u64,
    pub events_rejected: u64,
    pub badges_awarded: u64,
    pub level_ups: u64,
    pub notifications_buffered: u64,
    pub notifications_delivered: u64,
    pub notifications_dropped: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        events_processed: EVENTS_PROCESSED.load(Ordering::Relaxed),
        events_deduped: EVENTS_DEDUPED.load(Ordering::Relaxed),
        events_rejected: EVENTS_REJECTED.load(Ordering::Relaxed),
        badges_awarded: BADGES_AWARDED.load(Ordering::Relaxed),
        level_ups: LEVEL_UPS.load(Ordering::Relaxed),
        notifications_buffered: NOTIFICATIONS_BUFFERED.load(Ordering::Relaxed),
        notifications_delivered: NOTIFICATIONS_DELIVERED.load(Ordering::Relaxed),
        notifications_dropped: NOTIFICATIONS_DROPPED.load(Ordering::Relaxed),
    }
}
