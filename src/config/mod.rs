//! # Engine Configuration
//!
//! Static, versioned configuration for the engagement engine: the scoring
//! table, the level ladder, the badge catalog, and notification buffering.
//! Loaded once at process start; the engine treats it as immutable.
//!
//! Configuration is TOML on disk. Every section has full defaults, so an
//! empty file is valid and [`EngineConfig::default`] matches a freshly
//! generated `engagement.toml`. Catalog entries may be added over time
//! without any data migration: new badges are simply evaluated against
//! existing statistics the next time an event fires.
//!
//! ```rust,no_run
//! use layover_engine::config::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::load("engagement.toml").await?;
//!     println!("{} badges, {} tiers", config.badges.len(), config.levels.len());
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::engine::badges::{seed_badge_catalog, BadgeCatalog, BadgeDefinition};
use crate::engine::levels::{default_level_table, LevelTable, LevelTier};
use crate::engine::score::ScoringConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NotificationConfig {
    /// Cap on buffered notifications per user while no sink is attached.
    /// Unset means unbounded; when set, the oldest event is dropped with a
    /// logged warning, never a synchronous wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffered_per_user: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Directory for the sled database.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/engagement".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default = "default_level_table")]
    pub levels: Vec<LevelTier>,
    #[serde(default = "seed_badge_catalog")]
    pub badges: Vec<BadgeDefinition>,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            levels: default_level_table(),
            badges: seed_badge_catalog(),
            notifications: NotificationConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = EngineConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Check the level-table partition and badge-id uniqueness without
    /// building the engine.
    pub fn validate(&self) -> Result<()> {
        LevelTable::new(self.levels.clone())
            .map_err(|e| anyhow!("Invalid level table: {}", e))?;
        BadgeCatalog::new(self.badges.clone())
            .map_err(|e| anyhow!("Invalid badge catalog: {}", e))?;
        Ok(())
    }
}
