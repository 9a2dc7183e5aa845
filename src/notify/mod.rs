//! Notification subsystem
//!
//! Unlock events flow from capsule actors onto an at-least-once queue; the
//! dispatcher drains it, delivers each event to an external sink, retries
//! failures up to a bound, and dead-letters what remains.

pub mod dispatcher;
pub mod queue;
pub mod sink;

pub use dispatcher::{DeadLetter, Dispatcher, MAX_DELIVERY_ATTEMPTS};
pub use queue::{Delivery, Queue, QueueClosed, QueueMessage};
pub use sink::{NotificationSink, SinkError, UnlockEvent, WebhookSink};
