use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::LedgerError;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub accounts: AccountConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// How long a transaction waits on a row lock before aborting with a
    /// retryable concurrency error.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_failure_escalation_threshold")]
    pub failure_escalation_threshold: u32,
    #[serde(default = "default_progress_log_every")]
    pub progress_log_every: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_min_stake_seconds")]
    pub min_stake_seconds: u64,
    #[serde(default)]
    pub forfeit_policy: ForfeitPolicy,
    #[serde(default = "default_activity_check_secs")]
    pub activity_check_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccountConfig {
    #[serde(default = "default_initial_seconds")]
    pub default_initial_seconds: u64,
}

/// Where forfeited stake goes.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForfeitPolicy {
    /// The staked seconds leave the ledger entirely.
    #[default]
    Destroy,
    /// The staked seconds are added to the reserve.
    Reserve,
}

fn default_db_path() -> String {
    "./data/ledger".to_string()
}

fn default_lock_timeout_ms() -> i64 {
    1000
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_failure_escalation_threshold() -> u32 {
    5
}

fn default_progress_log_every() -> u64 {
    10
}

fn default_min_stake_seconds() -> u64 {
    1
}

fn default_activity_check_secs() -> u64 {
    5
}

fn default_initial_seconds() -> u64 {
    86_400
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            failure_escalation_threshold: default_failure_escalation_threshold(),
            progress_log_every: default_progress_log_every(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_stake_seconds: default_min_stake_seconds(),
            forfeit_policy: ForfeitPolicy::default(),
            activity_check_secs: default_activity_check_secs(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            default_initial_seconds: default_initial_seconds(),
        }
    }
}

impl LedgerConfig {
    /// Strict load: missing or malformed files are errors.
    pub fn load(path: &str) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Storage(format!("reading {}: {}", path, e)))?;
        toml::from_str(&raw).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match Self::load(path) {
                Ok(c) => {
                    info!(path, "Config loaded");
                    c
                }
                Err(e) => {
                    warn!(path, error = %e, "Error loading config, using defaults");
                    Self::default()
                }
            }
        } else {
            info!(path, "Config file not found, creating default");
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                if let Err(e) = std::fs::write(path, s) {
                    warn!(path, error = %e, "Could not write default config");
                }
            }
            config
        }
    }
}
