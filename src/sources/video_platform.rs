//! HTTP client for the external video platform
//!
//! The platform exposes a batched "currently live" search over channel ids
//! and a single-video liveness check. Both are slow and rate limited; all
//! call budgeting happens in the refresher, this client only does transport.
//! Transport timeouts surface as errors and are treated by callers exactly
//! like an empty result.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{LiveSearchHit, VideoProvider};
use crate::errors::{AppError, Result};
use crate::models::StreamDescriptor;

const PROVIDER_NAME: &str = "video-platform";

#[derive(Debug, Clone)]
pub struct VideoPlatformSettings {
    pub api_url: String,
    pub api_key: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

pub struct VideoPlatformClient {
    client: reqwest::Client,
    settings: VideoPlatformSettings,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(rename = "channelId")]
    channel_id: String,
    title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    thumbnails: Option<Thumbnails>,
    #[serde(rename = "liveBroadcastContent")]
    live_broadcast_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(rename = "liveBroadcastContent")]
    live_broadcast_content: Option<String>,
}

impl VideoPlatformClient {
    pub fn new(settings: VideoPlatformSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    fn stream_from(item: SearchItem) -> LiveSearchHit {
        let thumbnail_url = item.snippet.thumbnails.and_then(|t| {
            t.high.map(|h| h.url).or(t.default.map(|d| d.url))
        });
        LiveSearchHit {
            provider_channel_id: item.snippet.channel_id,
            stream: StreamDescriptor {
                id: item.id.video_id,
                title: item.snippet.title,
                published_at: item.snippet.published_at,
                thumbnail_url,
            },
        }
    }
}

#[async_trait]
impl VideoProvider for VideoPlatformClient {
    async fn search_live(&self, provider_channel_ids: &[String]) -> Result<Vec<LiveSearchHit>> {
        if provider_channel_ids.is_empty() {
            return Ok(vec![]);
        }
        if provider_channel_ids.len() > self.settings.batch_size {
            return Err(AppError::provider(
                PROVIDER_NAME,
                format!(
                    "batch of {} exceeds cap of {}",
                    provider_channel_ids.len(),
                    self.settings.batch_size
                ),
            ));
        }

        let url = format!("{}/search", self.settings.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("eventType", "live"),
                ("channelId", &provider_channel_ids.join(",")),
                ("key", &self.settings.api_key),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SearchResponse = response.json().await?;
        debug!(
            channels = provider_channel_ids.len(),
            hits = body.items.len(),
            "Live search completed"
        );

        Ok(body
            .items
            .into_iter()
            .filter(|item| {
                item.snippet
                    .live_broadcast_content
                    .as_deref()
                    .is_none_or(|c| c == "live")
            })
            .map(Self::stream_from)
            .collect())
    }

    async fn is_video_live(&self, video_id: &str) -> Result<bool> {
        let url = format!("{}/videos", self.settings.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("id", video_id),
                ("key", &self.settings.api_key),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: VideoListResponse = response.json().await?;
        Ok(body.items.iter().any(|item| {
            item.snippet.live_broadcast_content.as_deref() == Some("live")
        }))
    }

    fn batch_limit(&self) -> usize {
        self.settings.batch_size
    }
}
