//! Cached live-status verdicts and per-channel failure tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One live stream as reported by the external video platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    /// Video id on the platform
    pub id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
}

/// Cached live/not-live verdict for one channel
///
/// Overwritten wholesale on each refresh. The persisted TTL is never
/// negative; raw negative values are remapped before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStatusCacheEntry {
    pub channel_id: Uuid,
    pub handle: String,
    pub is_live: bool,
    pub primary_stream_id: Option<String>,
    pub streams: Vec<StreamDescriptor>,
    pub last_updated: DateTime<Utc>,
    /// Seconds the verdict stays valid, derived from the schedule block
    pub ttl_seconds: i64,
    /// When the current schedule block ends, if known
    pub block_end_time: Option<DateTime<Utc>>,
    /// Seconds between point checks that a cached live stream is still live
    pub validation_cooldown_seconds: i64,
    pub last_validation: Option<DateTime<Utc>>,
}

impl LiveStatusCacheEntry {
    /// Age of the entry at `now`
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_updated).num_seconds()
    }

    /// Whether the entry's own TTL has fully elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age_seconds(now) >= self.ttl_seconds
    }

    /// Whether the given fraction of the TTL has elapsed
    pub fn elapsed_fraction(&self, now: DateTime<Utc>) -> f64 {
        if self.ttl_seconds <= 0 {
            return 1.0;
        }
        self.age_seconds(now) as f64 / self.ttl_seconds as f64
    }

    /// Whether a live verdict is due for a point re-validation
    pub fn validation_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_live {
            return false;
        }
        let last = self.last_validation.unwrap_or(self.last_updated);
        (now - last).num_seconds() >= self.validation_cooldown_seconds
    }
}

/// Per-channel failure state, scoped to the current on-air window
///
/// Created on the first failed lookup, cleared by any success, and bounded
/// by a record TTL so orphaned state self-heals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptTracking {
    pub handle: String,
    pub attempts: u32,
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    pub escalated: bool,
    /// End of the program whose window the failures belong to
    pub program_end_time: Option<DateTime<Utc>>,
    /// Provider lookups are skipped until this instant
    pub suppressed_until: Option<DateTime<Utc>>,
}

impl AttemptTracking {
    pub fn new(handle: &str, now: DateTime<Utc>) -> Self {
        Self {
            handle: handle.to_string(),
            attempts: 0,
            first_attempt: now,
            last_attempt: now,
            escalated: false,
            program_end_time: None,
            suppressed_until: None,
        }
    }

    pub fn is_suppressed(&self, now: DateTime<Utc>) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }
}
