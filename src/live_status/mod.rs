//! Live-status caching: failure tracking, background refresh, and the
//! read-side enrichment façade

pub mod attempt_tracker;
pub mod facade;
pub mod refresher;

pub use attempt_tracker::{AttemptTracker, RefreshContext, TrackerSettings};
pub use facade::{EnrichedEntry, EnrichmentSettings, LiveVerdict, ScheduleEnrichment};
pub use refresher::{LiveStatusRefresher, RefreshHandle, RefresherSettings};
