//! Schedule enrichment façade
//!
//! Read-side composition of the effective schedule with cached live status.
//! The façade never blocks on the external provider: a cache miss or stale
//! read degrades to schedule-based info and queues one deduplicated
//! asynchronous refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::cache_store::{self, CacheStore, keys};
use crate::errors::Result;
use crate::models::{Channel, DayOfWeek, LiveStatusCacheEntry, ScheduleEntry, StreamDescriptor};
use crate::sources::ScheduleSource;

use super::attempt_tracker::AttemptTracker;
use super::refresher::RefreshHandle;

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Trust a not-live cache entry younger than this even while the
    /// schedule claims on-air
    pub trust_not_live_within: Duration,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            trust_not_live_within: Duration::from_secs(600),
        }
    }
}

/// Live verdict attached to one effective schedule entry
#[derive(Debug, Clone, PartialEq)]
pub enum LiveVerdict {
    NotLive,
    /// The schedule claims on-air but no stream is confirmed; the background
    /// refresher will correct this if wrong
    Scheduled,
    Live {
        stream: StreamDescriptor,
        extra_streams: Vec<StreamDescriptor>,
    },
}

#[derive(Debug, Clone)]
pub struct EnrichedEntry {
    pub entry: ScheduleEntry,
    pub verdict: LiveVerdict,
}

pub struct ScheduleEnrichment {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn ScheduleSource>,
    tracker: Arc<AttemptTracker>,
    refresh: RefreshHandle,
    settings: EnrichmentSettings,
    tz: Tz,
}

impl ScheduleEnrichment {
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn ScheduleSource>,
        tracker: Arc<AttemptTracker>,
        refresh: RefreshHandle,
        settings: EnrichmentSettings,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            source,
            tracker,
            refresh,
            settings,
            tz,
        }
    }

    pub async fn enrich(
        &self,
        entries: Vec<ScheduleEntry>,
        want_live_status: bool,
    ) -> Result<Vec<EnrichedEntry>> {
        self.enrich_at(entries, want_live_status, Utc::now()).await
    }

    /// Enrich with an explicit reference instant
    pub async fn enrich_at(
        &self,
        entries: Vec<ScheduleEntry>,
        want_live_status: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<EnrichedEntry>> {
        if !want_live_status {
            // Fast path, no cache reads
            return Ok(entries
                .into_iter()
                .map(|entry| EnrichedEntry {
                    entry,
                    verdict: LiveVerdict::NotLive,
                })
                .collect());
        }

        let channels: HashMap<Uuid, Channel> = self
            .source
            .channels()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let program_visibility: HashMap<Uuid, bool> = self
            .source
            .programs()
            .await?
            .into_iter()
            .map(|p| (p.id, p.visible))
            .collect();

        let mut enriched = Vec::with_capacity(entries.len());
        for entry in entries {
            let verdict = self
                .verdict_for(&entry, &channels, &program_visibility, now)
                .await?;
            enriched.push(EnrichedEntry { entry, verdict });
        }
        Ok(enriched)
    }

    async fn verdict_for(
        &self,
        entry: &ScheduleEntry,
        channels: &HashMap<Uuid, Channel>,
        program_visibility: &HashMap<Uuid, bool>,
        now: DateTime<Utc>,
    ) -> Result<LiveVerdict> {
        let local = now.with_timezone(&self.tz).naive_local();
        let today = DayOfWeek::from_date(local.date());
        let on_air = entry.is_on_air(today, local.time());

        let Some(channel) = channels.get(&entry.channel_id) else {
            return Ok(LiveVerdict::NotLive);
        };
        let program_visible = match &entry.virtual_program {
            Some(program) => program.visible,
            None => program_visibility
                .get(&entry.program_id)
                .copied()
                .unwrap_or(false),
        };
        if !channel.visible || !program_visible {
            return Ok(LiveVerdict::NotLive);
        }
        if on_air && self.tracker.is_escalated(&channel.handle).await? {
            return Ok(LiveVerdict::NotLive);
        }
        if !channel.fetch_enabled {
            return Ok(LiveVerdict::NotLive);
        }
        if !on_air {
            return Ok(LiveVerdict::NotLive);
        }

        let cached = cache_store::get_json_lenient::<LiveStatusCacheEntry>(
            self.store.as_ref(),
            &keys::live_status(&channel.id),
        )
        .await?;

        match cached {
            Some(cache) if cache.is_live && !cache.is_expired(now) => {
                Ok(live_verdict(cache))
            }
            Some(cache)
                if !cache.is_live
                    && cache.age_seconds(now)
                        < self.settings.trust_not_live_within.as_secs() as i64 =>
            {
                // Fresh not-live verdict is trusted over the schedule claim
                Ok(LiveVerdict::Scheduled)
            }
            _ => {
                self.refresh.request(channel.id);
                Ok(LiveVerdict::Scheduled)
            }
        }
    }
}

fn live_verdict(cache: LiveStatusCacheEntry) -> LiveVerdict {
    let mut streams = cache.streams;
    let primary_index = cache
        .primary_stream_id
        .as_deref()
        .and_then(|id| streams.iter().position(|s| s.id == id))
        .unwrap_or(0);
    if streams.is_empty() {
        return LiveVerdict::Scheduled;
    }
    let stream = streams.remove(primary_index);
    LiveVerdict::Live {
        stream,
        extra_streams: streams,
    }
}
