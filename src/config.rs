use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const MIN_RETRY_COUNT: u32 = 1;
pub const MAX_RETRY_COUNT: u32 = 10;
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 10;
pub const MIN_HISTORY: u32 = 1;
pub const MAX_HISTORY: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_max_workers")]
    pub max_concurrent_workers: usize,

    #[serde(default = "default_history_count")]
    pub history_retention_count: u32,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sitewatch");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("sitewatch.db").to_string_lossy().to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_max_workers() -> usize {
    3
}

fn default_history_count() -> u32 {
    10
}

fn default_tick_interval() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_user_agent() -> String {
    "sitewatch/1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retry_count: default_retry_count(),
            max_concurrent_workers: default_max_workers(),
            history_retention_count: default_history_count(),
            tick_interval_secs: default_tick_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitewatch")
            .join("config.toml")
    }

    /// Freeze the tunables into the value the engine runs with. Out-of-range
    /// values are clamped rather than rejected.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            retry_count: self.retry_count.clamp(MIN_RETRY_COUNT, MAX_RETRY_COUNT),
            max_concurrent_workers: self.max_concurrent_workers.clamp(MIN_WORKERS, MAX_WORKERS),
            history_retention_count: self.history_retention_count.clamp(MIN_HISTORY, MAX_HISTORY),
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Immutable engine configuration, passed explicitly into the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub retry_count: u32,
    pub max_concurrent_workers: usize,
    pub history_retention_count: u32,
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            max_concurrent_workers: default_max_workers(),
            history_retention_count: default_history_count(),
            tick_interval: Duration::from_secs(default_tick_interval()),
            fetch_timeout: Duration::from_secs(default_fetch_timeout()),
            retry_backoff: Duration::from_millis(default_retry_backoff()),
        }
    }
}
