//! External collaborators the engine reads from
//!
//! The schedule source is read-only; the engine never mutates it. The video
//! provider is the slow, rate-limited search API the refresher budgets calls
//! against.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{Channel, Program, ScheduleEntry, StreamDescriptor};

mod schedule_api;
mod video_platform;

pub use schedule_api::HttpScheduleSource;
pub use video_platform::{VideoPlatformClient, VideoPlatformSettings};

/// Read-only provider of the base schedule and its channel/program metadata
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// The full weekly base schedule grid
    async fn base_entries(&self) -> Result<Vec<ScheduleEntry>>;

    async fn channels(&self) -> Result<Vec<Channel>>;

    async fn programs(&self) -> Result<Vec<Program>>;

    async fn find_entry(&self, id: Uuid) -> Result<Option<ScheduleEntry>>;

    async fn find_channel(&self, id: Uuid) -> Result<Option<Channel>>;

    async fn find_program(&self, id: Uuid) -> Result<Option<Program>>;
}

/// One live stream hit from a batched search, tagged with the provider-side
/// channel id it belongs to
#[derive(Debug, Clone)]
pub struct LiveSearchHit {
    pub provider_channel_id: String,
    pub stream: StreamDescriptor,
}

/// External video-platform search API
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Batched "currently live" search over provider channel ids. One call
    /// covers many channels, bounded by `batch_limit`. Returns zero or more
    /// hits; channels without a hit are not live as far as this call knows.
    async fn search_live(&self, provider_channel_ids: &[String]) -> Result<Vec<LiveSearchHit>>;

    /// Point check: is this specific video still live
    async fn is_video_live(&self, video_id: &str) -> Result<bool>;

    /// Maximum channel ids per `search_live` call
    fn batch_limit(&self) -> usize;
}
