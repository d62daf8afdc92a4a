//! Configuration model for the indexing framework.
//!
//! Loaded from a TOML file with serde defaults per section; unknown keys are
//! ignored. `DB_USERNAME`/`DB_PASSWORD` env vars override the file after
//! loading so credentials can stay out of checked-in configs.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub db: DbConfig,
    pub indexer: IndexerConfig,
    pub timeout: TimeoutConfig,
    pub logger: LoggerConfig,
}

impl BaseConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("DB_USERNAME") {
            self.db.username = username;
        }
        if let Ok(password) = std::env::var("DB_PASSWORD") {
            self.db.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.indexer.confirmations == 0 {
            return Err(IndexerError::Config(
                "number of confirmations should be set to a positive integer".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub log_queries: bool,
    pub drop_table_at_start: bool,
    /// Seconds of history to retain; 0 disables history drops.
    pub history_drop: u64,
    /// Minimum seconds between history drops; 0 falls back to `history_drop`.
    pub history_drop_frequency: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            db_name: String::new(),
            log_queries: false,
            drop_table_at_start: false,
            history_drop: 0,
            history_drop_frequency: 0,
        }
    }
}

impl DbConfig {
    /// Effective minimum interval between history drops.
    pub fn effective_history_drop_frequency(&self) -> u64 {
        if self.history_drop_frequency == 0 {
            self.history_drop
        } else {
            self.history_drop_frequency
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub confirmations: u64,
    pub max_block_range: u64,
    pub max_concurrency: usize,
    pub start_block_number: u64,
    /// Stop after this block; 0 runs forever.
    pub end_block_number: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            confirmations: 0,
            max_block_range: 1000,
            max_concurrency: 8,
            start_block_number: 0,
            end_block_number: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub backoff_max_elapsed_time_seconds: u64,
    pub request_timeout_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            backoff_max_elapsed_time_seconds: 300,
            request_timeout_millis: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// trace, debug, info, warn or error.
    pub level: String,
    /// Log file path; empty disables the file layer.
    pub file: String,
    /// In megabytes. Accepted for config compatibility; rotation is left to
    /// the deployment.
    pub max_file_size: u64,
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "debug".into(),
            file: String::new(),
            max_file_size: 0,
            console: true,
        }
    }
}

/// The chain-specific `[blockchain]` config section.
pub trait ChainConfig: DeserializeOwned + Default {
    fn apply_env_overrides(&mut self) {}
}
