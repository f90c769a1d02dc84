//! Achievement ledger: the idempotency record of which (user, badge) pairs
//! have been awarded.
//!
//! `award` is the single idempotency boundary for badge unlocking. The badge
//! evaluator may run redundantly (retried updates, replayed events) without
//! risk of duplicate unlocks: row creation is a compare-and-swap insert, so
//! exactly one caller ever observes `was_new`.

use std::collections::HashSet;

use log::{debug, info};

use crate::engine::errors::EngineError;
use crate::engine::types::{Achievement, ACHIEVEMENT_SCHEMA_VERSION};
use crate::storage::StatsStore;

pub struct AchievementLedger {
    tree: sled::Tree,
}

impl AchievementLedger {
    pub fn new(store: &StatsStore) -> Self {
        Self {
            tree: store.ledger_tree(),
        }
    }

    fn row_key(user_id: &str, badge_id: &str) -> Vec<u8> {
        format!("achievements:{}:{}", user_id, badge_id).into_bytes()
    }

    fn user_prefix(user_id: &str) -> Vec<u8> {
        format!("achievements:{}:", user_id).into_bytes()
    }

    /// Attempt to create the row for (user, badge). Returns whether the row
    /// is new; an existing row makes the call a no-op reporting `false`.
    pub fn award(&self, user_id: &str, badge_id: &str) -> Result<bool, EngineError> {
        let record = Achievement::new(user_id, badge_id);
        let bytes = bincode::serialize(&record)?;
        let key = Self::row_key(user_id, badge_id);
        let swap = self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?;
        match swap {
            Ok(()) => {
                self.tree.flush()?;
                info!("badge '{}' awarded to {}", badge_id, user_id);
                crate::metrics::inc_badges_awarded();
                Ok(true)
            }
            Err(_) => {
                debug!("badge '{}' already on ledger for {}", badge_id, user_id);
                Ok(false)
            }
        }
    }

    /// Whether the row for (user, badge) exists.
    pub fn is_earned(&self, user_id: &str, badge_id: &str) -> Result<bool, EngineError> {
        Ok(self.tree.get(Self::row_key(user_id, badge_id))?.is_some())
    }

    /// All earned badge ids for a user, for feeding the badge evaluator.
    pub fn earned_ids(&self, user_id: &str) -> Result<HashSet<String>, EngineError> {
        Ok(self
            .list_earned(user_id)?
            .into_iter()
            .map(|a| a.badge_id)
            .collect())
    }

    /// All achievement rows for a user.
    pub fn list_earned(&self, user_id: &str) -> Result<Vec<Achievement>, EngineError> {
        let mut rows = Vec::new();
        for entry in self.tree.scan_prefix(Self::user_prefix(user_id)) {
            let (_key, bytes) = entry?;
            let record: Achievement = bincode::deserialize(&bytes)?;
            if record.schema_version != ACHIEVEMENT_SCHEMA_VERSION {
                return Err(EngineError::SchemaMismatch {
                    entity: "achievement",
                    expected: ACHIEVEMENT_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            rows.push(record);
        }
        Ok(rows)
    }

    /// Mark a row as delivered to the UI. Missing rows are an error: the
    /// caller must have awarded first.
    pub fn mark_notified(&self, user_id: &str, badge_id: &str) -> Result<(), EngineError> {
        let key = Self::row_key(user_id, badge_id);
        let Some(bytes) = self.tree.get(&key)? else {
            return Err(EngineError::UnknownBadge(format!(
                "no achievement row for {} / {}",
                user_id, badge_id
            )));
        };
        let mut record: Achievement = bincode::deserialize(&bytes)?;
        if record.notified {
            return Ok(());
        }
        record.notified = true;
        self.tree.insert(key, bincode::serialize(&record)?)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Administrative reset: delete every achievement row for a user.
    /// Returns the number of rows removed.
    pub fn reset_user(&self, user_id: &str) -> Result<usize, EngineError> {
        let keys: Result<Vec<_>, sled::Error> = self
            .tree
            .scan_prefix(Self::user_prefix(user_id))
            .map(|entry| entry.map(|(key, _)| key))
            .collect();
        let keys = keys?;
        let removed = keys.len();
        for key in keys {
            self.tree.remove(key)?;
        }
        self.tree.flush()?;
        if removed > 0 {
            info!("reset {} achievement rows for {}", removed, user_id);
        }
        Ok(removed)
    }
}
