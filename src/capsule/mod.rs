//! Capsule domain
//!
//! A capsule is a named collection of timeline items and the unit of
//! partitioning: every capsule id owns exactly one actor, and all mutation
//! of that capsule's items is serialized through it.

pub mod actor;
pub mod item;
pub mod scheduler;
pub mod store;
pub mod validate;

pub use actor::{CapsuleHandle, CapsuleRegistry};
pub use item::{CapsuleId, ItemId, NewItem, TimelineItem};
pub use scheduler::SchedulerHandle;
pub use store::{ItemStore, SqliteItemStore};
