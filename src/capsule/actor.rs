//! Per-capsule single-writer actor
//!
//! Every capsule id owns exactly one actor task, spawned lazily by the
//! registry. Commands arrive on a FIFO mpsc channel, so all operations on
//! one capsule are strictly serialized with no explicit locking, while
//! distinct capsules proceed fully in parallel.
//!
//! The actor composes the validator and the item store, and re-evaluates
//! pending unlocks on every add, every list, and every scheduler wake-up.

use super::item::{CapsuleId, ItemId, NewItem, TimelineItem};
use super::scheduler::SchedulerHandle;
use super::store::ItemStore;
use super::validate;
use crate::error::{Result, TuncError};
use crate::notify::queue::Queue;
use crate::notify::sink::UnlockEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 64;

enum CapsuleCommand {
    Init {
        reply: oneshot::Sender<Result<()>>,
    },
    AddItem {
        input: NewItem,
        reply: oneshot::Sender<Result<TimelineItem>>,
    },
    ListItems {
        reply: oneshot::Sender<Result<Vec<TimelineItem>>>,
    },
    DeleteItem {
        item: ItemId,
        reply: oneshot::Sender<Result<bool>>,
    },
    Wake,
}

/// Handle to one capsule's actor task
#[derive(Clone)]
pub struct CapsuleHandle {
    capsule: CapsuleId,
    tx: mpsc::Sender<CapsuleCommand>,
}

impl CapsuleHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<R>>) -> CapsuleCommand,
    ) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| TuncError::ActorUnavailable(self.capsule.to_string()))?;
        reply_rx
            .await
            .map_err(|_| TuncError::ActorUnavailable(self.capsule.to_string()))?
    }

    pub async fn init(&self) -> Result<()> {
        self.request(|reply| CapsuleCommand::Init { reply }).await
    }

    pub async fn add_item(&self, input: NewItem) -> Result<TimelineItem> {
        self.request(|reply| CapsuleCommand::AddItem { input, reply })
            .await
    }

    pub async fn list_items(&self) -> Result<Vec<TimelineItem>> {
        self.request(|reply| CapsuleCommand::ListItems { reply })
            .await
    }

    pub async fn delete_item(&self, item: ItemId) -> Result<bool> {
        self.request(|reply| CapsuleCommand::DeleteItem { item, reply })
            .await
    }

    /// Scheduler wake-up: zero arguments, no response payload.
    pub async fn wake(&self) {
        let _ = self.tx.send(CapsuleCommand::Wake).await;
    }
}

/// Registry mapping capsule ids to running actors
///
/// Actors are spawned on first use and replaced transparently if their task
/// has gone away.
pub struct CapsuleRegistry {
    store: Arc<dyn ItemStore>,
    queue: Queue<UnlockEvent>,
    scheduler: SchedulerHandle,
    actors: Mutex<HashMap<CapsuleId, CapsuleHandle>>,
}

impl CapsuleRegistry {
    pub fn new(
        store: Arc<dyn ItemStore>,
        queue: Queue<UnlockEvent>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            store,
            queue,
            scheduler,
            actors: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for a capsule's actor, spawning it if needed.
    pub async fn handle(&self, capsule: CapsuleId) -> CapsuleHandle {
        let mut actors = self.actors.lock().await;
        if let Some(handle) = actors.get(&capsule) {
            if !handle.tx.is_closed() {
                return handle.clone();
            }
        }

        debug!(capsule = %capsule, "spawning capsule actor");
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = CapsuleActor {
            capsule,
            store: self.store.clone(),
            queue: self.queue.clone(),
            scheduler: self.scheduler.clone(),
        };
        tokio::spawn(actor.run(rx));

        let handle = CapsuleHandle { capsule, tx };
        actors.insert(capsule, handle.clone());
        handle
    }

    pub async fn init(&self, capsule: CapsuleId) -> Result<()> {
        self.handle(capsule).await.init().await
    }

    pub async fn add_item(&self, capsule: CapsuleId, input: NewItem) -> Result<TimelineItem> {
        self.handle(capsule).await.add_item(input).await
    }

    pub async fn list_items(&self, capsule: CapsuleId) -> Result<Vec<TimelineItem>> {
        self.handle(capsule).await.list_items().await
    }

    pub async fn delete_item(&self, capsule: CapsuleId, item: ItemId) -> Result<bool> {
        self.handle(capsule).await.delete_item(item).await
    }

    /// Deliver a scheduler wake-up to the owning actor.
    pub async fn wake(&self, capsule: CapsuleId) {
        self.handle(capsule).await.wake().await
    }
}

struct CapsuleActor {
    capsule: CapsuleId,
    store: Arc<dyn ItemStore>,
    queue: Queue<UnlockEvent>,
    scheduler: SchedulerHandle,
}

impl CapsuleActor {
    async fn run(self, mut rx: mpsc::Receiver<CapsuleCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                CapsuleCommand::Init { reply } => {
                    let _ = reply.send(self.store.init(&self.capsule).map_err(Into::into));
                }
                CapsuleCommand::AddItem { input, reply } => {
                    let _ = reply.send(self.add_item(input).await);
                }
                CapsuleCommand::ListItems { reply } => {
                    let _ = reply.send(self.list_items().await);
                }
                CapsuleCommand::DeleteItem { item, reply } => {
                    let _ = reply.send(self.store.delete(&self.capsule, &item).map_err(Into::into));
                }
                CapsuleCommand::Wake => self.wake().await,
            }
        }
        debug!(capsule = %self.capsule, "capsule actor stopping");
    }

    async fn add_item(&self, input: NewItem) -> Result<TimelineItem> {
        // validation failures persist nothing
        let message = validate::validate_new_item(&self.capsule, &input)?;

        let item = TimelineItem {
            id: ItemId::new(),
            message,
            opening_date: input.opening_date,
            attachments: input.attachments,
            created_at: Utc::now(),
            notified: false,
        };
        self.store.append(&self.capsule, &item)?;

        // the new item is already durable; an unlock-check hiccup here must
        // not fail the add, the next pass covers it
        match self.store.list(&self.capsule) {
            Ok(mut items) => {
                self.unlock_pass(&mut items).await;
                Ok(items.into_iter().find(|i| i.id == item.id).unwrap_or(item))
            }
            Err(error) => {
                warn!(capsule = %self.capsule, error = %error, "unlock check skipped after add");
                Ok(item)
            }
        }
    }

    async fn list_items(&self) -> Result<Vec<TimelineItem>> {
        let mut items = self.store.list(&self.capsule)?;
        self.unlock_pass(&mut items).await;
        Ok(items)
    }

    async fn wake(&self) {
        match self.store.list(&self.capsule) {
            Ok(mut items) => self.unlock_pass(&mut items).await,
            Err(error) => {
                warn!(capsule = %self.capsule, error = %error, "wake-up unlock check failed to load items");
            }
        }
    }

    /// Emit one unlock event per newly-due item, persist the notified
    /// flags, then arm the scheduler at the earliest remaining future
    /// unlock (or disarm when none is left).
    async fn unlock_pass(&self, items: &mut [TimelineItem]) {
        let now = Utc::now();

        for item in items.iter_mut() {
            if item.notified || !item.is_due(now) {
                continue;
            }

            let event = UnlockEvent {
                capsule_id: self.capsule,
                item_id: item.id,
            };
            if self.queue.send(event).is_err() {
                // leave the flag unset so the item stays eligible next pass
                warn!(capsule = %self.capsule, item = %item.id, "unlock event enqueue failed");
                continue;
            }

            match self.store.mark_notified(&self.capsule, &item.id) {
                Ok(()) => item.notified = true,
                Err(error) => {
                    // the event is out; redelivery on the next pass is the
                    // at-least-once tradeoff
                    warn!(
                        capsule = %self.capsule,
                        item = %item.id,
                        error = %error,
                        "failed to persist notified flag"
                    );
                }
            }
        }

        let next_wake = items
            .iter()
            .filter(|item| !item.notified)
            .filter_map(TimelineItem::opening_datetime)
            .filter(|opens_at| *opens_at > now)
            .min();

        match next_wake {
            Some(at) => self.scheduler.arm(self.capsule, at),
            None => self.scheduler.disarm(self.capsule),
        }
    }
}
