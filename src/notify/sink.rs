//! Notification delivery targets

use crate::capsule::item::{CapsuleId, ItemId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unlock event emitted by a capsule actor when a locked item opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockEvent {
    pub capsule_id: CapsuleId,
    pub item_id: ItemId,
}

/// Delivery errors: retried by the dispatcher up to the bound
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("sink rejected payload: status {0}")]
    Rejected(u16),
}

/// A target that receives unlock notifications, one outbound call per event
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &UnlockEvent) -> Result<(), SinkError>;
}

/// Webhook sink: POSTs each event as JSON
pub struct WebhookSink {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl WebhookSink {
    /// Build a sink for the given webhook URL. A malformed URL is a
    /// configuration error and fails here, at startup.
    pub fn new(url: &str) -> crate::Result<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| crate::TuncError::Config(format!("invalid webhook URL: {e}")))?;
        Ok(Self {
            url,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, event: &UnlockEvent) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(capsule = %event.capsule_id, item = %event.item_id, "notification delivered");
        Ok(())
    }
}
