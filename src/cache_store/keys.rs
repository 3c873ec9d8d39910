//! Store key layout
//!
//! All keys live under one prefix so several deployments can share a store.

use chrono::NaiveDate;
use uuid::Uuid;

pub const PREFIX: &str = "onair";

/// Live-status cache entry for one channel
pub fn live_status(channel_id: &Uuid) -> String {
    format!("{PREFIX}:livestatus:{channel_id}")
}

/// Short-lived refresh lock for one channel
pub fn refresh_lock(channel_id: &Uuid) -> String {
    format!("{PREFIX}:lock:refresh:{channel_id}")
}

/// Attempt tracking record for one channel handle
pub fn attempts(handle: &str) -> String {
    format!("{PREFIX}:attempts:{handle}")
}

/// Weekly override record
pub fn override_record(week_start: NaiveDate, scope_key: &str) -> String {
    format!("{PREFIX}:override:{}:{scope_key}", week_start.format("%Y-%m-%d"))
}

/// Pattern matching every override record of one week
pub fn override_week_pattern(week_start: NaiveDate) -> String {
    format!("{PREFIX}:override:{}:*", week_start.format("%Y-%m-%d"))
}

/// Pattern matching every override record; cleanup sweep only
pub fn override_all_pattern() -> String {
    format!("{PREFIX}:override:*")
}

/// Resolved effective schedule for one week
pub fn resolved_week(week_start: NaiveDate) -> String {
    format!("{PREFIX}:schedule:resolved:{}", week_start.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_keys_nest_under_week() {
        let week = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let key = override_record(week, "program:abc");
        assert_eq!(key, "onair:override:2026-08-24:program:abc");
        assert!(key.starts_with(&override_week_pattern(week).trim_end_matches('*').to_string()));
    }
}
