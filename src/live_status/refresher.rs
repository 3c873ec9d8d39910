//! Background live-status refresher
//!
//! Drives the per-channel `UNKNOWN -> LIVE / NOT_LIVE` state machine from
//! two periodic ticks plus an on-demand queue fed by the read façade. Every
//! provider call is guarded by a per-channel auto-expiring lock in the
//! shared store, so concurrent ticks and replicas never duplicate work: the
//! loser of the lock race performs a cheap no-op. Failures are caught at the
//! tick boundary; each tick is independent and idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache_store::{self, CacheStore, keys};
use crate::errors::Result;
use crate::models::{Channel, LiveStatusCacheEntry, ScheduleEntry, StreamDescriptor};
use crate::notifications::{EscalationAlert, NotificationSink, StreamChangeEvent};
use crate::schedule::{BlockTtlCalculator, OverrideService};
use crate::sources::{LiveSearchHit, ScheduleSource, VideoProvider};
use crate::utils::week_start;

use super::attempt_tracker::{AttemptTracker, RefreshContext};

#[derive(Debug, Clone)]
pub struct RefresherSettings {
    pub primary_interval: Duration,
    pub fixup_interval: Duration,
    pub lock_ttl: Duration,
    /// TTL of the short "not live" entry written after an empty result
    pub not_live_ttl: Duration,
    /// Refresh once this percentage of an entry's TTL has elapsed
    pub refresh_threshold_percent: u8,
    pub validation_cooldown: Duration,
    pub queue_capacity: usize,
}

impl Default for RefresherSettings {
    fn default() -> Self {
        Self {
            primary_interval: Duration::from_secs(120),
            fixup_interval: Duration::from_secs(30),
            lock_ttl: Duration::from_secs(60),
            not_live_ttl: Duration::from_secs(120),
            refresh_threshold_percent: 80,
            validation_cooldown: Duration::from_secs(300),
            queue_capacity: 64,
        }
    }
}

/// Handle the façade uses to request an out-of-band refresh.
///
/// Non-blocking and deduplicated: a channel already queued or in flight is
/// not queued again, and a full queue drops the request rather than waiting.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<Uuid>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl RefreshHandle {
    /// Returns true when the request was actually enqueued
    pub fn request(&self, channel_id: Uuid) -> bool {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(channel_id) {
                return false;
            }
        }
        match self.tx.try_send(channel_id) {
            Ok(()) => true,
            Err(e) => {
                self.in_flight.lock().unwrap().remove(&channel_id);
                debug!(channel_id = %channel_id, "Dropped on-demand refresh request: {}", e);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }
}

pub struct LiveStatusRefresher {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn ScheduleSource>,
    provider: Arc<dyn VideoProvider>,
    overrides: Arc<OverrideService>,
    calculator: Arc<BlockTtlCalculator>,
    tracker: Arc<AttemptTracker>,
    sink: Arc<dyn NotificationSink>,
    settings: RefresherSettings,
    tz: Tz,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// What a tick decided to do for one on-air channel
enum RefreshDecision {
    Skip,
    Refresh,
    /// Cached live verdict is due for a point check against this video
    Validate(String),
}

impl LiveStatusRefresher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn ScheduleSource>,
        provider: Arc<dyn VideoProvider>,
        overrides: Arc<OverrideService>,
        calculator: Arc<BlockTtlCalculator>,
        tracker: Arc<AttemptTracker>,
        sink: Arc<dyn NotificationSink>,
        settings: RefresherSettings,
        tz: Tz,
    ) -> (Arc<Self>, RefreshHandle, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let handle = RefreshHandle {
            tx,
            in_flight: Arc::clone(&in_flight),
        };
        let refresher = Arc::new(Self {
            store,
            source,
            provider,
            overrides,
            calculator,
            tracker,
            sink,
            settings,
            tz,
            in_flight,
        });
        (refresher, handle, rx)
    }

    /// Main loop: two periodic ticks plus the on-demand queue, until
    /// cancellation
    pub async fn run(
        self: Arc<Self>,
        mut queue_rx: mpsc::Receiver<Uuid>,
        cancel: CancellationToken,
    ) {
        let mut primary = tokio::time::interval(self.settings.primary_interval);
        let mut fixup = tokio::time::interval(self.settings.fixup_interval);
        primary.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        fixup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            primary = ?self.settings.primary_interval,
            fixup = ?self.settings.fixup_interval,
            "Live-status refresher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Live-status refresher stopping");
                    break;
                }
                _ = primary.tick() => {
                    if let Err(e) = self.tick(RefreshContext::Primary).await {
                        warn!("Primary refresh tick failed: {}", e);
                    }
                }
                _ = fixup.tick() => {
                    if let Err(e) = self.tick(RefreshContext::Fixup).await {
                        warn!("Fix-up refresh tick failed: {}", e);
                    }
                }
                Some(channel_id) = queue_rx.recv() => {
                    if let Err(e) = self.refresh_one(channel_id).await {
                        warn!(channel_id = %channel_id, "On-demand refresh failed: {}", e);
                    }
                    self.in_flight.lock().unwrap().remove(&channel_id);
                }
            }
        }
    }

    /// One refresh pass over the currently on-air channel set
    pub async fn tick(&self, ctx: RefreshContext) -> Result<()> {
        let now = Utc::now();
        let local = now.with_timezone(&self.tz).naive_local();

        let on_air = self.on_air_channels(local).await?;
        if on_air.is_empty() {
            return Ok(());
        }

        let mut to_refresh: Vec<(Channel, Vec<ScheduleEntry>)> = Vec::new();
        for (channel, entries) in on_air {
            if self.tracker.is_suppressed(&channel.handle, now).await? {
                debug!(handle = %channel.handle, "Skipping suppressed channel");
                continue;
            }

            let cached = cache_store::get_json_lenient::<LiveStatusCacheEntry>(
                self.store.as_ref(),
                &keys::live_status(&channel.id),
            )
            .await?;

            match self.decide(cached.as_ref(), now) {
                RefreshDecision::Skip => {}
                RefreshDecision::Refresh => to_refresh.push((channel, entries)),
                RefreshDecision::Validate(video_id) => {
                    let Some(entry) = cached else { continue };
                    if !self.acquire_lock(&channel.id).await? {
                        continue;
                    }
                    if self.still_live(&video_id).await {
                        self.touch_validation(entry, now).await?;
                    } else {
                        // The cached stream ended; full refresh
                        self.refresh_channels(vec![(channel, entries)], ctx, now, local)
                            .await?;
                    }
                }
            }
        }

        let mut locked: Vec<(Channel, Vec<ScheduleEntry>)> = Vec::new();
        for (channel, entries) in to_refresh {
            if self.acquire_lock(&channel.id).await? {
                locked.push((channel, entries));
            }
        }

        self.refresh_channels(locked, ctx, now, local).await
    }

    /// On-demand refresh for one channel; same lock-guarded path as a tick.
    /// Runs without suppression privileges.
    pub async fn refresh_one(&self, channel_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let local = now.with_timezone(&self.tz).naive_local();

        let on_air = self.on_air_channels(local).await?;
        let Some(target) = on_air.into_iter().find(|(c, _)| c.id == channel_id) else {
            debug!(channel_id = %channel_id, "On-demand refresh for off-air channel; skipping");
            return Ok(());
        };

        if self.tracker.is_suppressed(&target.0.handle, now).await? {
            debug!(handle = %target.0.handle, "On-demand refresh for suppressed channel; skipping");
            return Ok(());
        }
        if !self.acquire_lock(&channel_id).await? {
            return Ok(());
        }
        self.refresh_channels(vec![target], RefreshContext::Fixup, now, local)
            .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Queryable channels on air at the local instant, paired with their
    /// entries for that day
    async fn on_air_channels(
        &self,
        local: NaiveDateTime,
    ) -> Result<Vec<(Channel, Vec<ScheduleEntry>)>> {
        let date = local.date();
        let today = crate::models::DayOfWeek::from_date(date);
        let effective = self.overrides.resolve_week(week_start(date)).await?;

        let channels: HashMap<Uuid, Channel> = self
            .source
            .channels()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut by_channel: HashMap<Uuid, Vec<ScheduleEntry>> = HashMap::new();
        for entry in effective {
            if entry.day == today {
                by_channel.entry(entry.channel_id).or_default().push(entry);
            }
        }

        let mut on_air = Vec::new();
        for (channel_id, entries) in by_channel {
            if !entries.iter().any(|e| e.is_on_air(today, local.time())) {
                continue;
            }
            let Some(channel) = channels.get(&channel_id) else {
                continue;
            };
            if !channel.fetch_enabled || channel.provider_channel_id.is_none() {
                continue;
            }
            on_air.push((channel.clone(), entries));
        }
        Ok(on_air)
    }

    fn decide(&self, cached: Option<&LiveStatusCacheEntry>, now: DateTime<Utc>) -> RefreshDecision {
        let Some(entry) = cached else {
            return RefreshDecision::Refresh;
        };
        if entry.is_expired(now) {
            return RefreshDecision::Refresh;
        }
        if entry.elapsed_fraction(now) * 100.0 >= self.settings.refresh_threshold_percent as f64 {
            return RefreshDecision::Refresh;
        }
        if entry.validation_due(now) {
            if let Some(video_id) = &entry.primary_stream_id {
                return RefreshDecision::Validate(video_id.clone());
            }
        }
        RefreshDecision::Skip
    }

    async fn acquire_lock(&self, channel_id: &Uuid) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(&keys::refresh_lock(channel_id), "1", self.settings.lock_ttl)
            .await?;
        if !acquired {
            debug!(channel_id = %channel_id, "Refresh lock held elsewhere; skipping");
        }
        Ok(acquired)
    }

    /// A transport error on a point check counts as "no longer live"
    async fn still_live(&self, video_id: &str) -> bool {
        match self.provider.is_video_live(video_id).await {
            Ok(live) => live,
            Err(e) => {
                debug!(video_id, "Point liveness check failed: {}", e);
                false
            }
        }
    }

    async fn touch_validation(
        &self,
        mut entry: LiveStatusCacheEntry,
        now: DateTime<Utc>,
    ) -> Result<()> {
        entry.last_validation = Some(now);
        let remaining = (entry.ttl_seconds - entry.age_seconds(now)).max(1);
        cache_store::set_json(
            self.store.as_ref(),
            &keys::live_status(&entry.channel_id),
            &entry,
            Duration::from_secs(remaining as u64),
        )
        .await
    }

    /// Query the provider for a set of locked channels and write the results.
    ///
    /// Channels are batched up to the provider's cap. Any channel absent from
    /// a non-empty batch result, or every channel of a batch that returned
    /// nothing, is retried individually before being treated as not live.
    async fn refresh_channels(
        &self,
        channels: Vec<(Channel, Vec<ScheduleEntry>)>,
        ctx: RefreshContext,
        now: DateTime<Utc>,
        local: NaiveDateTime,
    ) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }

        let batch_limit = self.provider.batch_limit().max(1);
        for chunk in channels.chunks(batch_limit) {
            let provider_ids: Vec<String> = chunk
                .iter()
                .filter_map(|(c, _)| c.provider_channel_id.clone())
                .collect();

            let mut hits_by_provider_id: HashMap<String, Vec<StreamDescriptor>> = HashMap::new();
            match self.provider.search_live(&provider_ids).await {
                Ok(hits) => {
                    for LiveSearchHit {
                        provider_channel_id,
                        stream,
                    } in hits
                    {
                        hits_by_provider_id
                            .entry(provider_channel_id)
                            .or_default()
                            .push(stream);
                    }
                }
                Err(e) => {
                    warn!("Batched live search failed, retrying individually: {}", e);
                }
            }

            for (channel, entries) in chunk {
                let provider_id = channel
                    .provider_channel_id
                    .clone()
                    .unwrap_or_default();
                let streams = match hits_by_provider_id.remove(&provider_id) {
                    Some(streams) => streams,
                    None => self.search_individually(&provider_id).await,
                };
                self.apply_result(channel, entries, streams, ctx, now, local)
                    .await?;
            }
        }
        Ok(())
    }

    /// Fallback single-channel search; a transport error counts as empty
    async fn search_individually(&self, provider_id: &str) -> Vec<StreamDescriptor> {
        let ids = [provider_id.to_string()];
        match self.provider.search_live(&ids).await {
            Ok(hits) => hits
                .into_iter()
                .filter(|hit| hit.provider_channel_id == provider_id)
                .map(|hit| hit.stream)
                .collect(),
            Err(e) => {
                debug!(provider_id, "Individual live search failed: {}", e);
                vec![]
            }
        }
    }

    async fn apply_result(
        &self,
        channel: &Channel,
        entries: &[ScheduleEntry],
        mut streams: Vec<StreamDescriptor>,
        ctx: RefreshContext,
        now: DateTime<Utc>,
        local: NaiveDateTime,
    ) -> Result<()> {
        let key = keys::live_status(&channel.id);
        let previous = cache_store::get_json_lenient::<LiveStatusCacheEntry>(
            self.store.as_ref(),
            &key,
        )
        .await?;
        let previous_primary = previous.and_then(|e| e.primary_stream_id);

        if streams.is_empty() {
            self.apply_empty_result(channel, entries, ctx, now, local)
                .await?;
            if previous_primary.is_some() {
                self.sink
                    .stream_changed(StreamChangeEvent::new(channel.id, None, now))
                    .await;
            }
            return Ok(());
        }

        // Newest stream first; the primary is the most recently published
        streams.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let primary = streams[0].id.clone();

        let resolution = self.calculator.resolve(channel.id, entries, local);
        let ttl_seconds = resolution.ttl_seconds.max(1);
        let entry = LiveStatusCacheEntry {
            channel_id: channel.id,
            handle: channel.handle.clone(),
            is_live: true,
            primary_stream_id: Some(primary.clone()),
            streams,
            last_updated: now,
            ttl_seconds,
            block_end_time: resolution.block_end.and_then(|end| self.local_to_utc(end)),
            validation_cooldown_seconds: self.settings.validation_cooldown.as_secs() as i64,
            last_validation: None,
        };
        cache_store::set_json(
            self.store.as_ref(),
            &key,
            &entry,
            Duration::from_secs(ttl_seconds as u64),
        )
        .await?;
        self.tracker.record_success(&channel.handle).await?;
        debug!(
            handle = %channel.handle,
            primary = %primary,
            ttl = ttl_seconds,
            "Channel is live"
        );

        if previous_primary.as_deref() != Some(primary.as_str()) {
            self.sink
                .stream_changed(StreamChangeEvent::new(channel.id, Some(primary), now))
                .await;
        }
        Ok(())
    }

    /// Short-TTL "not live" entry plus a tracker failure; escalations emit a
    /// one-time alert
    async fn apply_empty_result(
        &self,
        channel: &Channel,
        entries: &[ScheduleEntry],
        ctx: RefreshContext,
        now: DateTime<Utc>,
        local: NaiveDateTime,
    ) -> Result<()> {
        let not_live_ttl = self.settings.not_live_ttl;
        let entry = LiveStatusCacheEntry {
            channel_id: channel.id,
            handle: channel.handle.clone(),
            is_live: false,
            primary_stream_id: None,
            streams: vec![],
            last_updated: now,
            ttl_seconds: not_live_ttl.as_secs() as i64,
            block_end_time: None,
            validation_cooldown_seconds: self.settings.validation_cooldown.as_secs() as i64,
            last_validation: None,
        };
        cache_store::set_json(
            self.store.as_ref(),
            &keys::live_status(&channel.id),
            &entry,
            not_live_ttl,
        )
        .await?;

        let program_end = self
            .calculator
            .block_end(entries, local)
            .and_then(|end| self.local_to_utc(end));
        let (_, newly_escalated) = self
            .tracker
            .record_failure(&channel.handle, program_end, ctx, now)
            .await?;

        if newly_escalated {
            let program = self.current_program_name(entries, local).await;
            self.sink
                .escalation(EscalationAlert {
                    channel: channel.name.clone(),
                    program,
                    time: now,
                })
                .await;
        }
        Ok(())
    }

    async fn current_program_name(
        &self,
        entries: &[ScheduleEntry],
        local: NaiveDateTime,
    ) -> Option<String> {
        let today = crate::models::DayOfWeek::from_date(local.date());
        let current = entries.iter().find(|e| e.is_on_air(today, local.time()))?;
        if let Some(program) = &current.virtual_program {
            return Some(program.name.clone());
        }
        self.source
            .find_program(current.program_id)
            .await
            .ok()
            .flatten()
            .map(|p| p.name)
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
