use std::time::Duration;

use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod defaults;

use defaults::*;

use crate::cache_store::RedisStoreConfig;

/// Schedule source and clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Base URL of the schedule source API
    pub source_url: String,
    /// Timezone the schedule grid is expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Gap under which adjacent entries merge into one block
    #[serde(default = "default_block_merge_gap")]
    pub block_merge_gap: String,
    /// Floor for the next-entry fallback TTL
    #[serde(default = "default_min_fallback_ttl")]
    pub min_fallback_ttl: String,
    /// Per-channel cooldown for negative-TTL anomaly warnings
    #[serde(default = "default_anomaly_warn_cooldown")]
    pub anomaly_warn_cooldown: String,
}

/// External video-platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    /// Channels per batched live-search call
    #[serde(default = "default_provider_batch_size")]
    pub batch_size: usize,
    /// Transport timeout; a timeout counts as an empty result
    #[serde(default = "default_provider_timeout")]
    pub timeout: String,
}

/// Background refresher cadence and budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Primary tick interval (full privileges over suppression windows)
    #[serde(default = "default_primary_interval")]
    pub primary_interval: String,
    /// Fix-up tick interval; catches fast program transitions but may only
    /// increment attempt counters
    #[serde(default = "default_fixup_interval")]
    pub fixup_interval: String,
    /// Auto-expiring per-channel refresh lock TTL
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl: String,
    /// TTL of the short "not live" entry written after an empty result
    #[serde(default = "default_not_live_ttl")]
    pub not_live_ttl: String,
    /// Refresh when this percentage of an entry's TTL has elapsed
    #[serde(default = "default_refresh_threshold_percent")]
    pub refresh_threshold_percent: u8,
    /// Cooldown between point checks that a cached live stream is still live
    #[serde(default = "default_validation_cooldown")]
    pub validation_cooldown: String,
    /// On-demand refresh queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Attempt tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Suppression window applied on attempts below the escalation threshold
    #[serde(default = "default_suppression_window")]
    pub suppression_window: String,
    /// Upper bound on tracker record lifetime when no program end is known
    #[serde(default = "default_tracker_record_ttl_cap")]
    pub record_ttl_cap: String,
    /// Consecutive failures that trigger escalation
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

/// Override resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridesConfig {
    /// TTL of the resolved-week schedule cache
    #[serde(default = "default_resolved_cache_ttl")]
    pub resolved_cache_ttl: String,
    /// Interval between expired-override cleanup sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: String,
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    /// Webhook receiving live-status-change events and escalation alerts;
    /// notifications are disabled when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: RedisStoreConfig,
    pub schedule: ScheduleConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub overrides: OverridesConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_block_merge_gap() -> String {
    DEFAULT_BLOCK_MERGE_GAP.to_string()
}
fn default_min_fallback_ttl() -> String {
    DEFAULT_MIN_FALLBACK_TTL.to_string()
}
fn default_anomaly_warn_cooldown() -> String {
    DEFAULT_ANOMALY_WARN_COOLDOWN.to_string()
}
fn default_provider_batch_size() -> usize {
    DEFAULT_PROVIDER_BATCH_SIZE
}
fn default_provider_timeout() -> String {
    DEFAULT_PROVIDER_TIMEOUT.to_string()
}
fn default_primary_interval() -> String {
    DEFAULT_PRIMARY_INTERVAL.to_string()
}
fn default_fixup_interval() -> String {
    DEFAULT_FIXUP_INTERVAL.to_string()
}
fn default_lock_ttl() -> String {
    DEFAULT_LOCK_TTL.to_string()
}
fn default_not_live_ttl() -> String {
    DEFAULT_NOT_LIVE_TTL.to_string()
}
fn default_refresh_threshold_percent() -> u8 {
    DEFAULT_REFRESH_THRESHOLD_PERCENT
}
fn default_validation_cooldown() -> String {
    DEFAULT_VALIDATION_COOLDOWN.to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_suppression_window() -> String {
    DEFAULT_SUPPRESSION_WINDOW.to_string()
}
fn default_tracker_record_ttl_cap() -> String {
    DEFAULT_TRACKER_RECORD_TTL_CAP.to_string()
}
fn default_escalation_threshold() -> u32 {
    DEFAULT_ESCALATION_THRESHOLD
}
fn default_resolved_cache_ttl() -> String {
    DEFAULT_RESOLVED_CACHE_TTL.to_string()
}
fn default_cleanup_interval() -> String {
    DEFAULT_CLEANUP_INTERVAL.to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            primary_interval: default_primary_interval(),
            fixup_interval: default_fixup_interval(),
            lock_ttl: default_lock_ttl(),
            not_live_ttl: default_not_live_ttl(),
            refresh_threshold_percent: default_refresh_threshold_percent(),
            validation_cooldown: default_validation_cooldown(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            suppression_window: default_suppression_window(),
            record_ttl_cap: default_tracker_record_ttl_cap(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

impl Default for OverridesConfig {
    fn default() -> Self {
        Self {
            resolved_cache_ttl: default_resolved_cache_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: RedisStoreConfig::default(),
            schedule: ScheduleConfig {
                source_url: "http://localhost:9080".to_string(),
                timezone: default_timezone(),
                block_merge_gap: default_block_merge_gap(),
                min_fallback_ttl: default_min_fallback_ttl(),
                anomaly_warn_cooldown: default_anomaly_warn_cooldown(),
            },
            provider: ProviderConfig {
                api_url: "https://www.googleapis.com/youtube/v3".to_string(),
                api_key: String::new(),
                batch_size: default_provider_batch_size(),
                timeout: default_provider_timeout(),
            },
            refresh: RefreshConfig::default(),
            tracker: TrackerConfig::default(),
            overrides: OverridesConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Parse the configured schedule timezone
    pub fn timezone(&self) -> Result<Tz> {
        self.schedule
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.schedule.timezone, e))
    }
}

/// Parse a humantime duration string like "2m" or "90s"
pub fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| anyhow::anyhow!("Invalid duration for {}: '{}': {}", field, value, e))
}
