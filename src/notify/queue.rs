//! In-process at-least-once queue
//!
//! Exposes `send`, `receive_batch`, and per-delivery `ack`/`retry`. Attempt
//! counts are tracked by the queue, never reconstructed by the consumer:
//! the first delivery of a message carries `attempts = 1` and every `retry`
//! re-enqueues it with the count incremented.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// Error returned when sending to a closed queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue closed")]
pub struct QueueClosed;

/// A message body together with its queue-tracked attempt count
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage<T> {
    pub body: T,
    pub attempts: u32,
}

struct Inner<T> {
    messages: Mutex<VecDeque<QueueMessage<T>>>,
    notify: Notify,
    closed: AtomicBool,
}

/// At-least-once message queue
///
/// Cloning is cheap and clones share the same queue.
pub struct Queue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                messages: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a message for first delivery.
    pub fn send(&self, body: T) -> Result<(), QueueClosed> {
        if self.is_closed() {
            return Err(QueueClosed);
        }
        self.push(QueueMessage { body, attempts: 1 });
        Ok(())
    }

    fn push(&self, message: QueueMessage<T>) {
        self.inner.messages.lock().unwrap().push_back(message);
        self.inner.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting new messages. Pending messages stay receivable so a
    /// consumer can drain to shutdown.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Remove and return everything currently queued, for inspection or
    /// manual replay.
    pub fn drain(&self) -> Vec<QueueMessage<T>> {
        self.inner.messages.lock().unwrap().drain(..).collect()
    }

    /// Wait until at least one message is available, then take up to `max`.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn receive_batch(&self, max: usize) -> Option<Vec<Delivery<T>>> {
        loop {
            {
                let mut messages = self.inner.messages.lock().unwrap();
                if !messages.is_empty() {
                    let take = max.min(messages.len());
                    let batch = messages
                        .drain(..take)
                        .map(|message| Delivery {
                            body: message.body,
                            attempts: message.attempts,
                            queue: self.clone(),
                        })
                        .collect();
                    return Some(batch);
                }
            }
            if self.is_closed() {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }
}

/// One delivery of a queued message.
///
/// Every delivery must be resolved as exactly one of: `ack` (drop), `retry`
/// (redeliver with the attempt count incremented), or consumption via
/// `into_body` (equivalent to an ack).
pub struct Delivery<T> {
    body: T,
    attempts: u32,
    queue: Queue<T>,
}

impl<T> Delivery<T> {
    pub fn body(&self) -> &T {
        &self.body
    }

    /// Delivery attempt count, starting at 1 for the first delivery
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Acknowledge: the message will not be redelivered.
    pub fn ack(self) {}

    /// Consume the delivery, acknowledging it, and take the body.
    pub fn into_body(self) -> T {
        self.body
    }

    /// Request redelivery. The queue increments the attempt count; a closed
    /// queue still accepts retries of already-delivered messages so nothing
    /// is dropped mid-drain.
    pub fn retry(self) {
        let Delivery {
            body,
            attempts,
            queue,
        } = self;
        queue.push(QueueMessage {
            body,
            attempts: attempts + 1,
        });
    }
}
