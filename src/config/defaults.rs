/// Configuration default values
///
/// Central location for every configurable default so operational tuning is
/// visible in one place.
// Schedule defaults
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_BLOCK_MERGE_GAP: &str = "2m";
pub const DEFAULT_MIN_FALLBACK_TTL: &str = "1m";
pub const DEFAULT_ANOMALY_WARN_COOLDOWN: &str = "5m";

// Provider defaults
pub const DEFAULT_PROVIDER_BATCH_SIZE: usize = 50;
pub const DEFAULT_PROVIDER_TIMEOUT: &str = "10s";

// Refresh defaults
pub const DEFAULT_PRIMARY_INTERVAL: &str = "2m";
pub const DEFAULT_FIXUP_INTERVAL: &str = "30s";
pub const DEFAULT_LOCK_TTL: &str = "1m";
pub const DEFAULT_NOT_LIVE_TTL: &str = "2m";
pub const DEFAULT_REFRESH_THRESHOLD_PERCENT: u8 = 80;
pub const DEFAULT_VALIDATION_COOLDOWN: &str = "5m";
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

// Tracker defaults
pub const DEFAULT_SUPPRESSION_WINDOW: &str = "15m";
pub const DEFAULT_TRACKER_RECORD_TTL_CAP: &str = "24h";
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

// Override defaults
pub const DEFAULT_RESOLVED_CACHE_TTL: &str = "5m";
pub const DEFAULT_CLEANUP_INTERVAL: &str = "1h";
