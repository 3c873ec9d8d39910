//! HTTP schedule source
//!
//! Reads the base schedule grid and channel/program metadata from the
//! persistence service's JSON API. Times arrive as "HH:MM[:SS]" strings and
//! are parsed up front so the rest of the engine only sees typed entries.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use super::ScheduleSource;
use crate::errors::{AppError, Result};
use crate::models::{Channel, DayOfWeek, Program, Provenance, ScheduleEntry};
use crate::utils::timefmt::parse_time_of_day;

pub struct HttpScheduleSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    id: Uuid,
    program_id: Uuid,
    channel_id: Uuid,
    day_of_week: String,
    start_time: String,
    end_time: String,
}

impl HttpScheduleSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    fn decode_entry(wire: WireEntry) -> Result<ScheduleEntry> {
        let day = DayOfWeek::parse(&wire.day_of_week).ok_or_else(|| {
            AppError::validation(format!("Unknown day_of_week '{}'", wire.day_of_week))
        })?;
        let start_time = parse_time_of_day(&wire.start_time).map_err(AppError::validation)?;
        let end_time = parse_time_of_day(&wire.end_time).map_err(AppError::validation)?;

        Ok(ScheduleEntry {
            id: wire.id,
            program_id: wire.program_id,
            channel_id: wire.channel_id,
            day,
            start_time,
            end_time,
            provenance: Provenance::Base,
            virtual_program: None,
        })
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn base_entries(&self) -> Result<Vec<ScheduleEntry>> {
        let wire: Vec<WireEntry> = self.fetch("/schedule/entries").await?;
        wire.into_iter().map(Self::decode_entry).collect()
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        self.fetch("/channels").await
    }

    async fn programs(&self) -> Result<Vec<Program>> {
        self.fetch("/programs").await
    }

    async fn find_entry(&self, id: Uuid) -> Result<Option<ScheduleEntry>> {
        match self
            .fetch::<WireEntry>(&format!("/schedule/entries/{id}"))
            .await
        {
            Ok(wire) => Ok(Some(Self::decode_entry(wire)?)),
            Err(AppError::Http(e)) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        match self.fetch::<Channel>(&format!("/channels/{id}")).await {
            Ok(channel) => Ok(Some(channel)),
            Err(AppError::Http(e)) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_program(&self, id: Uuid) -> Result<Option<Program>> {
        match self.fetch::<Program>(&format!("/programs/{id}")).await {
            Ok(program) => Ok(Some(program)),
            Err(AppError::Http(e)) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
