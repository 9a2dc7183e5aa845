//! Error types for Tunc
//!
//! Defines the crate-wide error enum covering all failure modes across the
//! system. Uses thiserror for ergonomic error handling.
//!
//! The taxonomy is deliberate: validation errors are caller-fault and never
//! retried; storage errors surface immediately without internal retry;
//! delivery errors are retried by the dispatcher up to a bound and then
//! dead-lettered; configuration errors fail fast at startup.

use crate::capsule::store::StoreError;
use crate::capsule::validate::ValidationError;
use thiserror::Error;

/// Result type alias for Tunc operations
pub type Result<T> = std::result::Result<T, TuncError>;

/// Comprehensive error type for Tunc operations
#[derive(Error, Debug)]
pub enum TuncError {
    /// Malformed caller input (empty message, bad date, foreign attachment, ...)
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Durable item store unreachable or rejected an operation
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// The capsule actor task is gone (channel closed before replying)
    #[error("capsule actor unavailable: {0}")]
    ActorUnavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
