//! Service configuration management.
//!
//! Configuration is stored at `~/.config/nregacache/config.json`. Every field
//! has a default, so a missing or partial file is fine. After loading, a small
//! set of environment variables (usually provided through `.env`) override the
//! file: `UPSTREAM_BASE_URL`, `ENABLE_REDIS`, `REDIS_URL`,
//! `NREGACACHE_DATA_DIR` and `PRIORITY_STATE_CODE`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::freshness::DEFAULT_MAX_AGE_HOURS;
use crate::models::DEFAULT_STATE_CODE;

/// Application name used for config/data directory paths
const APP_NAME: &str = "nregacache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_UPSTREAM_BASE_URL: &str = "https://mnregaweb4.nic.in/netnrega/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    /// Maximum age of a stored record before upstream is consulted again.
    pub freshness_max_age_hours: i64,
    /// Root of the record store. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Directory for rolling log files. Defaults to the platform cache directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            freshness_max_age_hours: DEFAULT_MAX_AGE_HOURS,
            data_dir: None,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// Backoff before retry `n` is `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            timeout_secs: 10,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub enable_redis: bool,
    pub redis_url: String,
    /// Prefix for every distributed cache key.
    pub redis_namespace: String,
    /// Upper bound on a single distributed cache call.
    pub redis_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            enable_redis: false,
            redis_url: "redis://localhost:6379".to_string(),
            redis_namespace: APP_NAME.to_string(),
            redis_timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refresh_interval_hours: u64,
    /// Pause between districts in a refresh batch.
    pub region_delay_ms: u64,
    /// Local hour (0-23) the retention cleanup runs at.
    pub cleanup_hour: u32,
    pub retention_years: i32,
    pub priority_state_code: String,
    /// Cap on regions refreshed when the priority state has none registered.
    pub max_priority_regions: usize,
    /// Districts that receive synthesized history when the registry is seeded.
    pub seed_sample_size: usize,
    pub seed_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_hours: 4,
            region_delay_ms: 2000,
            cleanup_hour: 2,
            retention_years: 5,
            priority_state_code: DEFAULT_STATE_CODE.to_string(),
            max_priority_regions: 20,
            seed_sample_size: 10,
            seed_delay_ms: 500,
        }
    }
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours * 60 * 60)
    }

    pub fn region_delay(&self) -> Duration {
        Duration::from_millis(self.region_delay_ms)
    }

    pub fn seed_delay(&self) -> Duration {
        Duration::from_millis(self.seed_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Write the full configuration, defaults included, as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("UPSTREAM_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(flag) = lookup("ENABLE_REDIS") {
            self.cache.enable_redis = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = url;
        }
        if let Some(dir) = lookup("NREGACACHE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(code) = lookup("PRIORITY_STATE_CODE") {
            self.scheduler.priority_state_code = code;
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.log_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }
}
