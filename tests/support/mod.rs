//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use onair::errors::Result;
use onair::models::{Channel, DayOfWeek, Program, Provenance, ScheduleEntry, StreamDescriptor};
use onair::notifications::{EscalationAlert, NotificationSink, StreamChangeEvent};
use onair::sources::{LiveSearchHit, ScheduleSource, VideoProvider};

/// Fixed in-memory schedule source
#[derive(Default)]
pub struct StaticScheduleSource {
    pub entries: Vec<ScheduleEntry>,
    pub channels: Vec<Channel>,
    pub programs: Vec<Program>,
}

#[async_trait]
impl ScheduleSource for StaticScheduleSource {
    async fn base_entries(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self.entries.clone())
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        Ok(self.channels.clone())
    }

    async fn programs(&self) -> Result<Vec<Program>> {
        Ok(self.programs.clone())
    }

    async fn find_entry(&self, id: Uuid) -> Result<Option<ScheduleEntry>> {
        Ok(self.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn find_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        Ok(self.channels.iter().find(|c| c.id == id).cloned())
    }

    async fn find_program(&self, id: Uuid) -> Result<Option<Program>> {
        Ok(self.programs.iter().find(|p| p.id == id).cloned())
    }
}

/// Provider stub serving a fixed live map and counting every call
#[derive(Default)]
pub struct ScriptedProvider {
    live: Mutex<HashMap<String, Vec<StreamDescriptor>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live(&self, provider_channel_id: &str, streams: Vec<StreamDescriptor>) {
        self.live
            .lock()
            .unwrap()
            .insert(provider_channel_id.to_string(), streams);
    }

    pub fn set_offline(&self, provider_channel_id: &str) {
        self.live.lock().unwrap().remove(provider_channel_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    async fn search_live(&self, provider_channel_ids: &[String]) -> Result<Vec<LiveSearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let live = self.live.lock().unwrap();
        Ok(provider_channel_ids
            .iter()
            .filter_map(|id| live.get(id).map(|streams| (id, streams)))
            .flat_map(|(id, streams)| {
                streams.iter().cloned().map(|stream| LiveSearchHit {
                    provider_channel_id: id.clone(),
                    stream,
                })
            })
            .collect())
    }

    async fn is_video_live(&self, video_id: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let live = self.live.lock().unwrap();
        Ok(live
            .values()
            .flatten()
            .any(|stream| stream.id == video_id))
    }

    fn batch_limit(&self) -> usize {
        50
    }
}

/// Sink recording every event it receives
#[derive(Default)]
pub struct RecordingSink {
    pub stream_changes: Mutex<Vec<StreamChangeEvent>>,
    pub escalations: Mutex<Vec<EscalationAlert>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn stream_changed(&self, event: StreamChangeEvent) {
        self.stream_changes.lock().unwrap().push(event);
    }

    async fn escalation(&self, alert: EscalationAlert) {
        self.escalations.lock().unwrap().push(alert);
    }
}

pub fn stream(id: &str) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        title: format!("Stream {id}"),
        published_at: Some(Utc::now()),
        thumbnail_url: None,
    }
}

/// A channel visible and queryable against the provider
pub fn channel(name: &str, handle: &str, provider_id: &str) -> Channel {
    Channel {
        id: Uuid::new_v4(),
        name: name.to_string(),
        handle: handle.to_string(),
        provider_channel_id: Some(provider_id.to_string()),
        visible: true,
        fetch_enabled: true,
    }
}

/// An entry covering the whole current day, so it is on air whenever the
/// test happens to run
pub fn all_day_entry(channel_id: Uuid, program_id: Uuid) -> ScheduleEntry {
    let today = Utc::now().date_naive();
    ScheduleEntry {
        id: Uuid::new_v4(),
        program_id,
        channel_id,
        day: DayOfWeek::from_date(today),
        start_time: chrono::NaiveTime::MIN,
        end_time: chrono::NaiveTime::MIN,
        provenance: Provenance::Base,
        virtual_program: None,
    }
}
