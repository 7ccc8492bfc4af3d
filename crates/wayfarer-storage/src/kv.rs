//! Key-value persistence.
//!
//! A single key holds the whole serialized transcript, so the interface is
//! deliberately small: get, set, remove.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::OptionalExtension;
use tracing::debug;

use wayfarer_core::error::WayfarerError;

use crate::db::Database;

/// String-keyed text storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, WayfarerError>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> Result<(), WayfarerError>;

    /// Delete a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), WayfarerError>;
}

// =============================================================================
// SQLite
// =============================================================================

/// [`KeyValueStore`] backed by the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db: Arc<Database>,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, WayfarerError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| WayfarerError::Storage(format!("Failed to read key {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WayfarerError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value],
            )
            .map_err(|e| WayfarerError::Storage(format!("Failed to write key {}: {}", key, e)))?;
            debug!(key, bytes = value.len(), "Stored value");
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), WayfarerError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| {
                    WayfarerError::Storage(format!("Failed to remove key {}: {}", key, e))
                })?;
            Ok(())
        })
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local [`KeyValueStore`]. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, WayfarerError> {
        self.entries
            .lock()
            .map_err(|e| WayfarerError::Storage(format!("kv lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, WayfarerError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WayfarerError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), WayfarerError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_store() -> SqliteKeyValueStore {
        SqliteKeyValueStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_sqlite_get_missing_key() {
        let store = sqlite_store();
        assert!(store.get("chat_messages").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_set_and_get() {
        let store = sqlite_store();
        store.set("chat_messages", "[]").unwrap();
        assert_eq!(store.get("chat_messages").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_sqlite_set_overwrites() {
        let store = sqlite_store();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_sqlite_remove() {
        let store = sqlite_store();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        // Removing again is fine.
        store.remove("k").unwrap();
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let store = SqliteKeyValueStore::new(Arc::new(Database::new(&path).unwrap()));
            store.set("chat_messages", r#"[{"id":1}]"#).unwrap();
        }
        let store = SqliteKeyValueStore::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(
            store.get("chat_messages").unwrap().as_deref(),
            Some(r#"[{"id":1}]"#)
        );
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryKeyValueStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert!(store.contains_key("k"));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let a = MemoryKeyValueStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }
}
