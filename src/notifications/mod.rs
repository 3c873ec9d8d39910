//! Fire-and-forget notification sink
//!
//! The engine emits live-status-change events and escalation alerts. No
//! acknowledgment or delivery guarantee is required; failures are logged and
//! never propagated into the refresh path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Emitted when a channel's primary stream changes
#[derive(Debug, Clone, Serialize)]
pub struct StreamChangeEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub channel_id: Uuid,
    pub stream_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StreamChangeEvent {
    pub fn new(channel_id: Uuid, stream_id: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: "live_stream_changed",
            channel_id,
            stream_id,
            timestamp,
        }
    }
}

/// Emitted once when a channel escalates after repeated provider failures
#[derive(Debug, Clone, Serialize)]
pub struct EscalationAlert {
    pub channel: String,
    pub program: Option<String>,
    pub time: DateTime<Utc>,
}

/// Write-only collaborator accepting engine events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn stream_changed(&self, event: StreamChangeEvent);

    async fn escalation(&self, alert: EscalationAlert);
}

/// Webhook-backed sink; posts JSON, swallows failures
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn post<T: Serialize>(&self, kind: &str, payload: &T) {
        match self.client.post(&self.url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Delivered {} notification", kind);
            }
            Ok(response) => {
                warn!(
                    "Notification sink rejected {} event: {}",
                    kind,
                    response.status()
                );
            }
            Err(e) => {
                warn!("Failed to deliver {} notification: {}", kind, e);
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn stream_changed(&self, event: StreamChangeEvent) {
        self.post("stream-change", &event).await;
    }

    async fn escalation(&self, alert: EscalationAlert) {
        self.post("escalation", &alert).await;
    }
}

/// Sink that only logs; used when no webhook is configured
#[derive(Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn stream_changed(&self, event: StreamChangeEvent) {
        debug!(
            channel_id = %event.channel_id,
            stream_id = ?event.stream_id,
            "Live stream changed"
        );
    }

    async fn escalation(&self, alert: EscalationAlert) {
        warn!(
            channel = %alert.channel,
            program = ?alert.program,
            "Channel escalated after repeated provider failures"
        );
    }
}
