//! Durable item storage
//!
//! Thin contract over a transactional relational store, keyed by capsule id.
//! The owning capsule actor is the only writer; appends are atomic per item
//! so a failed write leaves no partial state visible to later reads.

use super::item::{CapsuleId, ItemId, TimelineItem};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Trait for item storage backends
///
/// `append` must be atomic per item, and `mark_notified` must never revert
/// an already-set flag.
pub trait ItemStore: Send + Sync {
    /// Ensure the backing state for a capsule exists. Idempotent; repeated
    /// calls never fail.
    fn init(&self, capsule: &CapsuleId) -> Result<()>;

    /// Append one item to a capsule.
    fn append(&self, capsule: &CapsuleId, item: &TimelineItem) -> Result<()>;

    /// All items in a capsule, ordered by creation time ascending.
    fn list(&self, capsule: &CapsuleId) -> Result<Vec<TimelineItem>>;

    /// Hard-delete an item. Returns whether a row was actually removed.
    fn delete(&self, capsule: &CapsuleId, item: &ItemId) -> Result<bool>;

    /// Record that the unlock event for an item has been emitted.
    fn mark_notified(&self, capsule: &CapsuleId, item: &ItemId) -> Result<()>;
}

/// SQLite-backed item store
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Open or create the item database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening item database");

        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers alongside the single writer
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT NOT NULL,
                capsule_id TEXT NOT NULL,
                message TEXT NOT NULL,
                attachments TEXT,
                opening_date TEXT,
                created_at TEXT NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (capsule_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_items_capsule_created
                ON items (capsule_id, created_at);
            "#,
        )?;
        Ok(())
    }
}

/// Fixed-precision RFC 3339 so timestamp strings sort chronologically
fn encode_created_at(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_created_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptRow(format!("bad created_at: {raw}")))
}

impl ItemStore for SqliteItemStore {
    fn init(&self, capsule: &CapsuleId) -> Result<()> {
        // The shared-table layout needs no per-capsule rows; re-running the
        // schema keeps this idempotent across restarts.
        tracing::debug!(capsule = %capsule, "init capsule");
        self.init_schema()
    }

    fn append(&self, capsule: &CapsuleId, item: &TimelineItem) -> Result<()> {
        let attachments = item
            .attachments
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO items (id, capsule_id, message, attachments, opening_date, created_at, notified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.id.to_string(),
                capsule.to_string(),
                item.message,
                attachments,
                item.opening_date,
                encode_created_at(&item.created_at),
                item.notified,
            ],
        )?;
        Ok(())
    }

    fn list(&self, capsule: &CapsuleId) -> Result<Vec<TimelineItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, message, attachments, opening_date, created_at, notified
             FROM items
             WHERE capsule_id = ?1
             ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map(params![capsule.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, message, attachments, opening_date, created_at, notified) = row?;
            items.push(TimelineItem {
                id: id
                    .parse()
                    .map_err(|_| StoreError::CorruptRow(format!("bad item id: {id}")))?,
                message,
                attachments: attachments
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?,
                opening_date,
                created_at: decode_created_at(&created_at)?,
                notified,
            });
        }
        Ok(items)
    }

    fn delete(&self, capsule: &CapsuleId, item: &ItemId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM items WHERE capsule_id = ?1 AND id = ?2",
            params![capsule.to_string(), item.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn mark_notified(&self, capsule: &CapsuleId, item: &ItemId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE items SET notified = 1 WHERE capsule_id = ?1 AND id = ?2",
            params![capsule.to_string(), item.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(message: &str) -> TimelineItem {
        TimelineItem {
            id: ItemId::new(),
            message: message.to_string(),
            opening_date: None,
            attachments: None,
            created_at: Utc::now(),
            notified: false,
        }
    }

    #[test]
    fn test_append_and_list_preserve_insertion_order() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();

        // same-microsecond created_at values must not reorder items
        let now = Utc::now();
        for n in 0..10 {
            let mut item = new_item(&format!("item {n}"));
            item.created_at = now;
            store.append(&capsule, &item).unwrap();
        }

        let items = store.list(&capsule).unwrap();
        let messages: Vec<_> = items.iter().map(|i| i.message.as_str()).collect();
        let expected: Vec<_> = (0..10).map(|n| format!("item {n}")).collect();
        assert_eq!(messages, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_capsules_are_isolated() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let a = CapsuleId::new();
        let b = CapsuleId::new();

        store.append(&a, &new_item("in a")).unwrap();
        store.append(&b, &new_item("in b")).unwrap();

        assert_eq!(store.list(&a).unwrap().len(), 1);
        assert_eq!(store.list(&a).unwrap()[0].message, "in a");
        assert_eq!(store.list(&b).unwrap()[0].message, "in b");
    }

    #[test]
    fn test_attachments_round_trip() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();

        let mut item = new_item("with attachments");
        item.attachments = Some(vec![
            "https://example.com/a.jpg".to_string(),
            format!("{capsule}/9f8b1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d"),
        ]);
        store.append(&capsule, &item).unwrap();

        let listed = store.list(&capsule).unwrap();
        assert_eq!(listed[0].attachments, item.attachments);
    }

    #[test]
    fn test_delete_reports_whether_row_removed() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();

        let item = new_item("delete me");
        store.append(&capsule, &item).unwrap();

        assert!(store.delete(&capsule, &item.id).unwrap());
        assert!(!store.delete(&capsule, &item.id).unwrap());
        assert!(store.list(&capsule).unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_scoped_to_capsule() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();
        let other = CapsuleId::new();

        let item = new_item("mine");
        store.append(&capsule, &item).unwrap();

        assert!(!store.delete(&other, &item.id).unwrap());
        assert_eq!(store.list(&capsule).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_notified_persists() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();

        let mut item = new_item("locked");
        item.opening_date = Some("2020-01-01".to_string());
        store.append(&capsule, &item).unwrap();

        store.mark_notified(&capsule, &item.id).unwrap();
        assert!(store.list(&capsule).unwrap()[0].notified);

        // marking again never reverts
        store.mark_notified(&capsule, &item.id).unwrap();
        assert!(store.list(&capsule).unwrap()[0].notified);
    }

    #[test]
    fn test_init_is_idempotent() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let capsule = CapsuleId::new();

        store.init(&capsule).unwrap();
        store.append(&capsule, &new_item("survives init")).unwrap();
        store.init(&capsule).unwrap();

        assert_eq!(store.list(&capsule).unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("items.db");
        let store = SqliteItemStore::open(&path).unwrap();
        store.append(&CapsuleId::new(), &new_item("persisted")).unwrap();
        assert!(path.exists());
    }
}
