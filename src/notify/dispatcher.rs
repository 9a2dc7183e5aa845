//! Notification dispatcher
//!
//! Drains the unlock queue in batches. Messages in a batch are processed
//! concurrently with independent outcomes: each one is acked on successful
//! delivery, retried while below the attempt bound, or published to the
//! dead-letter queue with diagnostic metadata once the bound is reached.
//! With no sink configured, every message goes straight to the dead-letter
//! queue; no amount of retrying fixes missing configuration.

use super::queue::{Delivery, Queue};
use super::sink::{NotificationSink, UnlockEvent};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Delivery attempts before a message is dead-lettered
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Record published to the dead-letter queue when delivery is exhausted,
/// preserving the original payload for offline inspection and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub original_body: UnlockEvent,
    pub attempts: u32,
    pub error: String,
}

/// At-least-once consumer of unlock events
pub struct Dispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
    dlq: Queue<DeadLetter>,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>, dlq: Queue<DeadLetter>) -> Self {
        Self {
            sink,
            dlq,
            max_attempts: MAX_DELIVERY_ATTEMPTS,
        }
    }

    /// Override the attempt bound (defaults to [`MAX_DELIVERY_ATTEMPTS`])
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Process one batch. Only returns once every message has resolved to
    /// exactly one of: acked, retried, or dead-lettered.
    pub async fn process_batch(&self, batch: Vec<Delivery<UnlockEvent>>) {
        join_all(batch.into_iter().map(|delivery| self.process_one(delivery))).await;
    }

    async fn process_one(&self, delivery: Delivery<UnlockEvent>) {
        let Some(sink) = &self.sink else {
            warn!(
                capsule = %delivery.body().capsule_id,
                item = %delivery.body().item_id,
                "no notification sink configured, dead-lettering"
            );
            self.dead_letter(delivery, "notification sink not configured".to_string());
            return;
        };

        match sink.deliver(delivery.body()).await {
            Ok(()) => {
                debug!(
                    capsule = %delivery.body().capsule_id,
                    item = %delivery.body().item_id,
                    "unlock notification delivered"
                );
                delivery.ack();
            }
            Err(error) if delivery.attempts() < self.max_attempts => {
                warn!(
                    attempts = delivery.attempts(),
                    error = %error,
                    "notification delivery failed, will retry"
                );
                delivery.retry();
            }
            Err(error) => {
                warn!(
                    attempts = delivery.attempts(),
                    error = %error,
                    "notification delivery exhausted, dead-lettering"
                );
                self.dead_letter(delivery, error.to_string());
            }
        }
    }

    fn dead_letter(&self, delivery: Delivery<UnlockEvent>, error: String) {
        let attempts = delivery.attempts();
        let dead = DeadLetter {
            original_body: delivery.into_body(),
            attempts,
            error,
        };
        if self.dlq.send(dead).is_err() {
            // Nothing left downstream; the loss is loud, never silent.
            tracing::error!("dead-letter queue closed, message lost");
        }
    }

    /// Drain `queue` until it is closed and empty.
    pub async fn run(&self, queue: Queue<UnlockEvent>, batch_size: usize) {
        info!(configured = self.sink.is_some(), "notification dispatcher started");
        while let Some(batch) = queue.receive_batch(batch_size).await {
            self.process_batch(batch).await;
        }
        info!("notification queue closed, dispatcher stopping");
    }
}
