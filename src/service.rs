//! Service wiring
//!
//! Assembles the store, capsule registry, unlock scheduler, and the
//! notification dispatcher into a running service. Scheduler wake-ups are
//! forwarded to the owning actors; the dispatcher drains the unlock queue
//! on its own task.

use crate::capsule::scheduler;
use crate::capsule::store::{ItemStore, SqliteItemStore};
use crate::capsule::CapsuleRegistry;
use crate::config::TuncConfig;
use crate::error::Result;
use crate::notify::{DeadLetter, Dispatcher, NotificationSink, Queue, UnlockEvent, WebhookSink};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A fully wired, running service
pub struct Service {
    pub registry: Arc<CapsuleRegistry>,
    pub queue: Queue<UnlockEvent>,
    pub dlq: Queue<DeadLetter>,
    wake_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl Service {
    /// Open the configured database and start all background tasks.
    pub fn start(config: &TuncConfig) -> Result<Self> {
        let store = Arc::new(SqliteItemStore::open(&config.db_path)?);
        Self::start_with_store(config, store)
    }

    /// Start against an existing store (tests use an in-memory one).
    pub fn start_with_store(config: &TuncConfig, store: Arc<dyn ItemStore>) -> Result<Self> {
        config.validate()?;

        let queue: Queue<UnlockEvent> = Queue::new();
        let dlq: Queue<DeadLetter> = Queue::new();

        let (scheduler, mut wake_rx) = scheduler::spawn();
        let registry = Arc::new(CapsuleRegistry::new(store, queue.clone(), scheduler));

        // scheduler fires with no caller present; route the wake-up to the
        // owning actor so it can run its unlock check cold
        let wake_registry = registry.clone();
        let wake_task = tokio::spawn(async move {
            while let Some(capsule) = wake_rx.recv().await {
                wake_registry.wake(capsule).await;
            }
        });

        let sink: Option<Arc<dyn NotificationSink>> = match &config.webhook_url {
            Some(url) => Some(Arc::new(WebhookSink::new(url)?)),
            None => None,
        };
        let dispatcher =
            Dispatcher::new(sink, dlq.clone()).with_max_attempts(config.max_delivery_attempts);
        let dispatch_queue = queue.clone();
        let batch_size = config.batch_size;
        let dispatch_task = tokio::spawn(async move {
            dispatcher.run(dispatch_queue, batch_size).await;
        });

        info!("service started");
        Ok(Self {
            registry,
            queue,
            dlq,
            wake_task,
            dispatch_task,
        })
    }

    /// Close the unlock queue, let the dispatcher drain it, then stop the
    /// remaining background tasks.
    pub async fn shutdown(self) {
        self.queue.close();
        let _ = self.dispatch_task.await;
        self.wake_task.abort();
        let _ = self.wake_task.await;
        info!("service stopped");
    }
}
