//! Per-channel failure and escalation tracking
//!
//! State machine per channel handle, scoped to one on-air window:
//! `NONE -> ATTEMPT(1) -> ATTEMPT(2) -> ESCALATED`. Early attempts set a
//! short suppression window; the escalation attempt suppresses until the
//! current program ends. Any success clears the record. State lives in the
//! shared store so every replica observes the same counters, bounded by a
//! record TTL so an orphaned record self-heals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache_store::{self, CacheStore, keys};
use crate::errors::Result;
use crate::models::AttemptTracking;

/// Who is driving a refresh, and with which privileges over suppression.
///
/// The fix-up context runs at a higher frequency to catch fast program
/// transitions; it may only increment the attempt counter. Letting it
/// create or extend suppression windows would starve the primary schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshContext {
    Primary,
    Fixup,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Suppression applied on attempts below the escalation threshold
    pub suppression_window: Duration,
    /// Record lifetime bound when no program end is known
    pub record_ttl_cap: Duration,
    /// Attempt count at which the channel escalates
    pub escalation_threshold: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            suppression_window: Duration::from_secs(15 * 60),
            record_ttl_cap: Duration::from_secs(24 * 3600),
            escalation_threshold: 3,
        }
    }
}

pub struct AttemptTracker {
    store: Arc<dyn CacheStore>,
    settings: TrackerSettings,
}

impl AttemptTracker {
    pub fn new(store: Arc<dyn CacheStore>, settings: TrackerSettings) -> Self {
        Self { store, settings }
    }

    pub async fn get(&self, handle: &str) -> Result<Option<AttemptTracking>> {
        cache_store::get_json_lenient(self.store.as_ref(), &keys::attempts(handle)).await
    }

    /// Whether provider lookups for this handle are currently suppressed
    pub async fn is_suppressed(&self, handle: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .get(handle)
            .await?
            .is_some_and(|tracking| tracking.is_suppressed(now)))
    }

    pub async fn is_escalated(&self, handle: &str) -> Result<bool> {
        Ok(self.get(handle).await?.is_some_and(|tracking| tracking.escalated))
    }

    /// Record one failed provider lookup. Returns the updated state and
    /// whether this failure crossed the escalation threshold.
    ///
    /// Only the primary context may set or extend suppression windows and
    /// mark escalation; the fix-up context increments the counter and
    /// nothing else.
    pub async fn record_failure(
        &self,
        handle: &str,
        program_end: Option<DateTime<Utc>>,
        ctx: RefreshContext,
        now: DateTime<Utc>,
    ) -> Result<(AttemptTracking, bool)> {
        let mut tracking = self
            .get(handle)
            .await?
            .unwrap_or_else(|| AttemptTracking::new(handle, now));

        tracking.attempts += 1;
        tracking.last_attempt = now;
        if program_end.is_some() {
            tracking.program_end_time = program_end;
        }

        let mut newly_escalated = false;
        if ctx == RefreshContext::Primary {
            if tracking.attempts >= self.settings.escalation_threshold {
                if !tracking.escalated {
                    tracking.escalated = true;
                    newly_escalated = true;
                    // Suppress for the rest of the program, or the record cap
                    // when its end is unknown
                    tracking.suppressed_until = Some(
                        tracking
                            .program_end_time
                            .unwrap_or(now + chrono::Duration::from_std(self.settings.record_ttl_cap)
                                .unwrap_or(chrono::Duration::hours(24))),
                    );
                    info!(
                        handle,
                        attempts = tracking.attempts,
                        until = ?tracking.suppressed_until,
                        "Channel escalated; suppressing provider lookups"
                    );
                }
            } else {
                let window = now
                    + chrono::Duration::from_std(self.settings.suppression_window)
                        .unwrap_or(chrono::Duration::minutes(15));
                tracking.suppressed_until = Some(match tracking.suppressed_until {
                    Some(existing) => existing.max(window),
                    None => window,
                });
            }
        }

        let ttl = self.record_ttl(&tracking, now);
        cache_store::set_json(self.store.as_ref(), &keys::attempts(handle), &tracking, ttl)
            .await?;
        debug!(
            handle,
            attempts = tracking.attempts,
            escalated = tracking.escalated,
            "Recorded failed provider lookup"
        );

        Ok((tracking, newly_escalated))
    }

    /// A successful lookup clears the tracker entirely, from any state
    pub async fn record_success(&self, handle: &str) -> Result<()> {
        self.store.delete(&keys::attempts(handle)).await?;
        Ok(())
    }

    /// Record lifetime: until the program ends, capped so unknown or distant
    /// ends still expire
    fn record_ttl(&self, tracking: &AttemptTracking, now: DateTime<Utc>) -> Duration {
        let cap = self.settings.record_ttl_cap;
        let until_end = tracking
            .program_end_time
            .map(|end| (end - now).num_seconds().max(60) as u64)
            .map(Duration::from_secs);
        match until_end {
            Some(ttl) => ttl.min(cap),
            None => cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::MemoryCacheStore;

    fn tracker() -> AttemptTracker {
        AttemptTracker::new(Arc::new(MemoryCacheStore::new()), TrackerSettings::default())
    }

    #[tokio::test]
    async fn test_three_failures_escalate_exactly_once() {
        let tracker = tracker();
        let now = Utc::now();
        let end = now + chrono::Duration::hours(1);

        let (t1, esc1) = tracker
            .record_failure("canal-1", Some(end), RefreshContext::Primary, now)
            .await
            .unwrap();
        assert_eq!(t1.attempts, 1);
        assert!(!esc1);
        assert!(t1.is_suppressed(now));

        let (t2, esc2) = tracker
            .record_failure("canal-1", Some(end), RefreshContext::Primary, now)
            .await
            .unwrap();
        assert_eq!(t2.attempts, 2);
        assert!(!esc2);

        let (t3, esc3) = tracker
            .record_failure("canal-1", Some(end), RefreshContext::Primary, now)
            .await
            .unwrap();
        assert_eq!(t3.attempts, 3);
        assert!(esc3);
        assert!(t3.escalated);
        // Suppressed until the program ends
        assert_eq!(t3.suppressed_until, Some(end));

        // A fourth failure does not re-announce the escalation
        let (_, esc4) = tracker
            .record_failure("canal-1", Some(end), RefreshContext::Primary, now)
            .await
            .unwrap();
        assert!(!esc4);
    }

    #[tokio::test]
    async fn test_success_clears_any_state() {
        let tracker = tracker();
        let now = Utc::now();

        tracker
            .record_failure("canal-1", None, RefreshContext::Primary, now)
            .await
            .unwrap();
        tracker
            .record_failure("canal-1", None, RefreshContext::Primary, now)
            .await
            .unwrap();
        assert!(tracker.get("canal-1").await.unwrap().is_some());

        tracker.record_success("canal-1").await.unwrap();
        assert!(tracker.get("canal-1").await.unwrap().is_none());

        // Counting restarts from zero
        let (t, _) = tracker
            .record_failure("canal-1", None, RefreshContext::Primary, now)
            .await
            .unwrap();
        assert_eq!(t.attempts, 1);
    }

    #[tokio::test]
    async fn test_fixup_context_never_suppresses_or_escalates() {
        let tracker = tracker();
        let now = Utc::now();

        for _ in 0..5 {
            let (t, escalated) = tracker
                .record_failure("canal-1", None, RefreshContext::Fixup, now)
                .await
                .unwrap();
            assert!(!escalated);
            assert!(!t.escalated);
            assert!(t.suppressed_until.is_none());
        }

        let t = tracker.get("canal-1").await.unwrap().unwrap();
        assert_eq!(t.attempts, 5);
        assert!(!tracker.is_suppressed("canal-1", now).await.unwrap());

        // The next primary failure is already past the threshold
        let (t, escalated) = tracker
            .record_failure("canal-1", None, RefreshContext::Primary, now)
            .await
            .unwrap();
        assert!(escalated);
        assert!(t.escalated);
    }

    #[tokio::test]
    async fn test_suppression_window_extends_not_shrinks() {
        let tracker = tracker();
        let now = Utc::now();

        let (t1, _) = tracker
            .record_failure("canal-1", None, RefreshContext::Primary, now)
            .await
            .unwrap();
        let first_window = t1.suppressed_until.unwrap();

        let later = now + chrono::Duration::minutes(5);
        let (t2, _) = tracker
            .record_failure("canal-1", None, RefreshContext::Primary, later)
            .await
            .unwrap();
        assert!(t2.suppressed_until.unwrap() > first_window);
    }
}
