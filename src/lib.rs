//! Tunc - Time-Capsule Timeline Core
//!
//! Collaborators attach timestamped items to a shared capsule (an event
//! timeline). Items may be time-locked until a future opening date; when a
//! lock opens, the owning capsule emits an unlock event onto a queue and an
//! at-least-once dispatcher delivers it to an external notification sink
//! with bounded retry and dead-letter fallback.
//!
//! # Architecture
//!
//! - **capsule**: item model, validation, durable storage, the per-capsule
//!   single-writer actor and its unlock scheduler
//! - **notify**: at-least-once queue, notification sinks, and the retry/DLQ
//!   dispatcher
//! - **config**: daemon configuration with fail-fast validation
//! - **service**: wiring of store, registry, scheduler, and dispatcher
//!
//! Routing, authentication, and blob storage are external collaborators;
//! this crate only exposes the actor surface they call into.

// Core modules
pub mod capsule;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod service;

// Re-exports
pub use capsule::{CapsuleId, CapsuleRegistry, ItemId, NewItem, TimelineItem};
pub use error::{Result, TuncError};
