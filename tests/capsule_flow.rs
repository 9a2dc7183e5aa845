//! Integration tests for Tunc
//!
//! These tests drive the full core: validation, the per-capsule actor,
//! unlock emission, and the notification dispatcher with retry/DLQ.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tunc::capsule::store::SqliteItemStore;
use tunc::capsule::{scheduler, CapsuleId, CapsuleRegistry, NewItem};
use tunc::config::TuncConfig;
use tunc::notify::{
    Dispatcher, NotificationSink, Queue, SinkError, UnlockEvent, MAX_DELIVERY_ATTEMPTS,
};
use tunc::service::Service;

/// Sink that records deliveries and fails the first `failures` calls
struct RecordingSink {
    calls: AtomicU32,
    failures: u32,
}

impl RecordingSink {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, _event: &UnlockEvent) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(SinkError::Delivery("transient outage".to_string()))
        } else {
            Ok(())
        }
    }
}

fn test_registry() -> (Arc<CapsuleRegistry>, Queue<UnlockEvent>) {
    let store = Arc::new(SqliteItemStore::open_in_memory().unwrap());
    let queue = Queue::new();
    let (scheduler, _wake_rx) = scheduler::spawn();
    (
        Arc::new(CapsuleRegistry::new(store, queue.clone(), scheduler)),
        queue,
    )
}

#[tokio::test]
async fn test_add_item_with_attachment_then_list() {
    let (registry, _queue) = test_registry();
    let capsule = CapsuleId::new();

    let blob_reference = format!("{capsule}/9f8b1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d");
    let created = registry
        .add_item(
            capsule,
            NewItem::new("hello").with_attachments(vec![blob_reference.clone()]),
        )
        .await
        .unwrap();

    assert_eq!(created.message, "hello");
    assert_eq!(created.attachments, Some(vec![blob_reference]));

    let items = registry.list_items(capsule).await.unwrap();
    assert_eq!(items, vec![created]);
}

#[tokio::test]
async fn test_items_keep_insertion_order_across_capsule_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("items.db");
    let capsule = CapsuleId::new();

    {
        let store = Arc::new(SqliteItemStore::open(&db_path).unwrap());
        let (scheduler, _wake) = scheduler::spawn();
        let registry = CapsuleRegistry::new(store, Queue::new(), scheduler);
        for n in 0..4 {
            registry
                .add_item(capsule, NewItem::new(format!("entry {n}")))
                .await
                .unwrap();
        }
    }

    // a fresh store over the same file sees the same order
    let store = Arc::new(SqliteItemStore::open(&db_path).unwrap());
    let (scheduler, _wake) = scheduler::spawn();
    let registry = CapsuleRegistry::new(store, Queue::new(), scheduler);

    let items = registry.list_items(capsule).await.unwrap();
    let messages: Vec<_> = items.iter().map(|i| i.message.as_str()).collect();
    assert_eq!(messages, vec!["entry 0", "entry 1", "entry 2", "entry 3"]);
}

#[tokio::test]
async fn test_past_dated_item_notifies_exactly_once_end_to_end() {
    let (registry, queue) = test_registry();
    let dlq = Queue::new();
    let sink = Arc::new(RecordingSink::new(0));
    let dispatcher = Dispatcher::new(Some(sink.clone()), dlq.clone());

    let capsule = CapsuleId::new();
    registry
        .add_item(
            capsule,
            NewItem::new("yesterday's news").with_opening_date("2020-01-01"),
        )
        .await
        .unwrap();

    // repeated lists must not re-emit
    registry.list_items(capsule).await.unwrap();
    registry.list_items(capsule).await.unwrap();

    let batch = queue.receive_batch(16).await.unwrap();
    assert_eq!(batch.len(), 1);
    dispatcher.process_batch(batch).await;

    assert_eq!(sink.calls(), 1);
    assert!(queue.is_empty());
    assert!(dlq.is_empty());
}

#[tokio::test]
async fn test_transient_sink_outage_is_retried_to_success() {
    let queue = Queue::new();
    let dlq = Queue::new();
    let sink = Arc::new(RecordingSink::new(2));
    let dispatcher = Dispatcher::new(Some(sink.clone()), dlq.clone());

    queue
        .send(UnlockEvent {
            capsule_id: CapsuleId::new(),
            item_id: tunc::ItemId::new(),
        })
        .unwrap();

    // attempts 1 and 2 fail, attempt 3 lands
    for _ in 0..3 {
        let batch = queue.receive_batch(16).await.unwrap();
        dispatcher.process_batch(batch).await;
    }

    assert_eq!(sink.calls(), 3);
    assert!(queue.is_empty());
    assert!(dlq.is_empty());
}

#[tokio::test]
async fn test_persistent_sink_outage_dead_letters_with_diagnostics() {
    let queue = Queue::new();
    let dlq = Queue::new();
    let sink = Arc::new(RecordingSink::new(u32::MAX));
    let dispatcher = Dispatcher::new(Some(sink), dlq.clone());

    let event = UnlockEvent {
        capsule_id: CapsuleId::new(),
        item_id: tunc::ItemId::new(),
    };
    queue.send(event).unwrap();

    for _ in 0..MAX_DELIVERY_ATTEMPTS {
        let batch = queue.receive_batch(16).await.unwrap();
        dispatcher.process_batch(batch).await;
    }

    assert!(queue.is_empty());
    let dead = dlq.drain();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body.original_body, event);
    assert_eq!(dead[0].body.attempts, MAX_DELIVERY_ATTEMPTS);
    assert!(dead[0].body.error.contains("transient outage"));
}

#[tokio::test]
async fn test_scheduler_wakes_actor_for_future_unlock() {
    // arm the scheduler directly at a near deadline and verify the wake
    // reaches the actor registry
    let store = Arc::new(SqliteItemStore::open_in_memory().unwrap());
    let queue = Queue::new();
    let (scheduler_handle, mut wake_rx) = scheduler::spawn();
    let registry = Arc::new(CapsuleRegistry::new(
        store,
        queue.clone(),
        scheduler_handle.clone(),
    ));

    let capsule = CapsuleId::new();
    registry.init(capsule).await.unwrap();
    scheduler_handle.arm(capsule, chrono::Utc::now() + chrono::Duration::milliseconds(50));

    let woken = tokio::time::timeout(Duration::from_secs(2), wake_rx.recv())
        .await
        .expect("wake-up should fire")
        .unwrap();
    assert_eq!(woken, capsule);

    // a wake-up with nothing due has no side effects
    registry.wake(woken).await;
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_full_service_round_trip() {
    let config = TuncConfig::default();
    let store = Arc::new(SqliteItemStore::open_in_memory().unwrap());
    let service = Service::start_with_store(&config, store).unwrap();
    let capsule = CapsuleId::new();

    service.registry.init(capsule).await.unwrap();
    let item = service
        .registry
        .add_item(capsule, NewItem::new("round trip"))
        .await
        .unwrap();
    assert_eq!(
        service.registry.list_items(capsule).await.unwrap(),
        vec![item]
    );

    service.shutdown().await;
}
