//! Sled-backed persistence for per-user statistics, dedupe keys, and the
//! achievement ledger.
//!
//! All mutation of a statistics document goes through [`StatsStore::apply_delta`],
//! which runs a transaction spanning the stats and dedupe trees: per-field
//! increments happen inside the transaction, so two concurrent deltas for the
//! same user never lose an increment and a replayed dedupe key is a no-op.
//! Whole-document overwrite from stale reads is structurally impossible.
//! State is partitioned by user id; no cross-user locking exists.

use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{IVec, Transactional};

use crate::engine::errors::EngineError;
use crate::engine::types::{StatisticsDelta, UserStatistics, STATS_SCHEMA_VERSION};

const TREE_STATS: &str = "engagement_stats";
const TREE_DEDUPE: &str = "engagement_dedupe";
const TREE_LEDGER: &str = "engagement_ledger";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct StatsStoreBuilder {
    path: PathBuf,
}

impl StatsStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<StatsStore, EngineError> {
        StatsStore::open(self.path)
    }
}

/// Durable store for engagement state. One sled database, three trees.
pub struct StatsStore {
    _db: sled::Db,
    stats: sled::Tree,
    dedupe: sled::Tree,
    ledger: sled::Tree,
}

impl StatsStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let stats = db.open_tree(TREE_STATS)?;
        let dedupe = db.open_tree(TREE_DEDUPE)?;
        let ledger = db.open_tree(TREE_LEDGER)?;
        Ok(Self {
            _db: db,
            stats,
            dedupe,
            ledger,
        })
    }

    fn stats_key(user_id: &str) -> Vec<u8> {
        format!("stats:{}", user_id).into_bytes()
    }

    fn dedupe_db_key(user_id: &str, token: &str) -> Vec<u8> {
        format!("dedupe:{}:{}", user_id, token).into_bytes()
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, EngineError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    pub(crate) fn ledger_tree(&self) -> sled::Tree {
        self.ledger.clone()
    }

    /// Fetch a user's statistics. Unknown users get the all-zero default
    /// document; it is not persisted until the first delta lands.
    pub fn read(&self, user_id: &str) -> Result<UserStatistics, EngineError> {
        let key = Self::stats_key(user_id);
        let Some(bytes) = self.stats.get(&key)? else {
            return Ok(UserStatistics::new(user_id));
        };
        let record: UserStatistics = Self::deserialize(bytes)?;
        if record.schema_version != STATS_SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch {
                entity: "user_statistics",
                expected: STATS_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Atomically apply a delta to a user's statistics.
    ///
    /// Returns the statistics *after* the update and whether the delta was
    /// actually applied: a dedupe token already recorded for this user makes
    /// the call a no-op returning the current document with `false`.
    pub fn apply_delta(
        &self,
        user_id: &str,
        delta: &StatisticsDelta,
        dedupe_token: Option<&str>,
    ) -> Result<(UserStatistics, bool), EngineError> {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string();
        let result = (&self.stats, &self.dedupe).transaction(|(stats_t, dedupe_t)| {
            let key = Self::stats_key(user_id);
            let mut record = match stats_t.get(key.as_slice())? {
                Some(bytes) => {
                    let record: UserStatistics = bincode::deserialize(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    if record.schema_version != STATS_SCHEMA_VERSION {
                        return Err(ConflictableTransactionError::Abort(
                            EngineError::SchemaMismatch {
                                entity: "user_statistics",
                                expected: STATS_SCHEMA_VERSION,
                                found: record.schema_version,
                            },
                        ));
                    }
                    record
                }
                None => UserStatistics::new(user_id),
            };

            if let Some(token) = dedupe_token {
                let dk = Self::dedupe_db_key(user_id, token);
                if dedupe_t.get(dk.as_slice())?.is_some() {
                    return Ok((record, false));
                }
                dedupe_t.insert(dk.as_slice(), stamp.as_bytes())?;
            }

            record
                .apply(delta)
                .map_err(ConflictableTransactionError::Abort)?;
            let bytes = bincode::serialize(&record)
                .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
            stats_t.insert(key.as_slice(), bytes)?;
            Ok((record, true))
        });

        match result {
            Ok((record, applied)) => {
                if applied {
                    self.stats.flush()?;
                    self.dedupe.flush()?;
                    debug!(
                        "applied delta for {} (score {:+} -> {})",
                        user_id, delta.score_delta, record.score
                    );
                } else {
                    debug!(
                        "dedupe token already recorded for {}; delta skipped",
                        user_id
                    );
                }
                Ok((record, applied))
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(EngineError::Sled(e)),
        }
    }

    /// Whether a dedupe token has been recorded for this user.
    pub fn has_dedupe_token(&self, user_id: &str, token: &str) -> Result<bool, EngineError> {
        Ok(self
            .dedupe
            .get(Self::dedupe_db_key(user_id, token))?
            .is_some())
    }

    /// Administrative score correction, the only path allowed to decrease
    /// the score. Floors at zero rather than rejecting an oversized
    /// negative adjustment. Counters are untouched.
    pub fn admin_adjust_score(
        &self,
        user_id: &str,
        adjustment: i64,
    ) -> Result<UserStatistics, EngineError> {
        let result = self.stats.transaction(|stats_t| {
            let key = Self::stats_key(user_id);
            let mut record = match stats_t.get(key.as_slice())? {
                Some(bytes) => {
                    let record: UserStatistics = bincode::deserialize(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    if record.schema_version != STATS_SCHEMA_VERSION {
                        return Err(ConflictableTransactionError::Abort(
                            EngineError::SchemaMismatch {
                                entity: "user_statistics",
                                expected: STATS_SCHEMA_VERSION,
                                found: record.schema_version,
                            },
                        ));
                    }
                    record
                }
                None => UserStatistics::new(user_id),
            };
            let adjusted = (record.score as i64).saturating_add(adjustment);
            if adjusted < 0 {
                warn!(
                    "admin adjustment {:+} for {} exceeds score {}; flooring at 0",
                    adjustment, user_id, record.score
                );
            }
            record.score = adjusted.max(0) as u64;
            record.touch();
            let bytes = bincode::serialize(&record)
                .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
            stats_t.insert(key.as_slice(), bytes)?;
            Ok(record)
        });
        match result {
            Ok(record) => {
                self.stats.flush()?;
                info!(
                    "admin score adjustment {:+} for {} (now {})",
                    adjustment, user_id, record.score
                );
                Ok(record)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(EngineError::Sled(e)),
        }
    }
}
