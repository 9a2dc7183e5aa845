//! Capsule and timeline item types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a capsule, the partition key for the actor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CapsuleId(Uuid);

impl CapsuleId {
    /// Generate a fresh capsule id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CapsuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CapsuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CapsuleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of a timeline item, unique within its capsule and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One message-plus-optional-attachments-and-unlock-date record in a capsule.
///
/// `notified` is internal bookkeeping (set once the unlock event has been
/// emitted) and is never serialized back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: ItemId,

    /// Plain text, 1-1000 characters after sanitization and trimming
    pub message: String,

    /// Calendar date (YYYY-MM-DD); the item is locked until this date
    #[serde(rename = "openingDate", skip_serializing_if = "Option::is_none")]
    pub opening_date: Option<String>,

    /// Up to 5 references: HTTPS URLs or `<capsuleId>/<blobId>` pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,

    /// Server-assigned creation time; defines retrieval order
    pub created_at: DateTime<Utc>,

    /// Whether an unlock event has been emitted for this item
    #[serde(default, skip_serializing)]
    pub notified: bool,
}

impl TimelineItem {
    /// The instant this item unlocks (midnight UTC of its opening date),
    /// or `None` for items without a lock.
    pub fn opening_datetime(&self) -> Option<DateTime<Utc>> {
        let date = self.opening_date.as_deref()?;
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        Some(parsed.and_hms_opt(0, 0, 0)?.and_utc())
    }

    /// Whether this item's lock has opened as of `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.opening_datetime() {
            Some(opens_at) => opens_at <= now,
            None => false,
        }
    }
}

/// Caller input for adding an item, prior to validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub message: String,

    #[serde(rename = "openingDate", skip_serializing_if = "Option::is_none")]
    pub opening_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
}

impl NewItem {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_opening_date(mut self, date: impl Into<String>) -> Self {
        self.opening_date = Some(date.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}
