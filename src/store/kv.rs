//! Key-value backends: a plain in-memory map and a SQLite table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::backend::KvStore;

/// Non-persistent key-value store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: HashMap<String, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.map.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Schema DDL run on open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
";

/// Persistent key-value store backed by one SQLite table.
///
/// Writes are batched in a transaction that [`KvStore::flush`] commits.
/// Anything not yet committed is rolled back when the store is dropped.
pub struct SqliteKv {
    path: PathBuf,
    conn: Connection,
}

impl SqliteKv {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| StoreError::db(&path, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::db(&path, e))?;
        debug!(path = %path.display(), "Opened record store");
        Ok(Self { path, conn })
    }

    /// Number of stored keys, uncommitted writes included.
    pub fn len(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .map_err(|e| StoreError::db(&self.path, e))?;
        Ok(count.unsigned_abs())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has_pending_writes(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| StoreError::db(&self.path, e))?;
        stmt.query_row([key], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::db(&self.path, e))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if !self.has_pending_writes() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| StoreError::db(&self.path, e))?;
        }
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")
            .map_err(|e| StoreError::db(&self.path, e))?;
        stmt.execute(params![key, value])
            .map_err(|e| StoreError::db(&self.path, e))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.has_pending_writes() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| StoreError::db(&self.path, e))?;
            debug!(path = %self.path.display(), "Committed record store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv() {
        let mut kv = MemoryKv::new();
        assert!(kv.get("a").unwrap().is_none());
        kv.set("a", b"1").unwrap();
        kv.set("a", b"2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some(&b"2"[..]));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_sqlite_kv_last_write_wins_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut kv = SqliteKv::open(&path).unwrap();
            kv.set("doc/1", b"first").unwrap();
            kv.set("doc/2", b"other").unwrap();
            kv.set("doc/1", b"second").unwrap();
            assert_eq!(kv.get("doc/1").unwrap().as_deref(), Some(&b"second"[..]));
            kv.flush().unwrap();
        }
        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.len().unwrap(), 2);
        assert_eq!(kv.get("doc/1").unwrap().as_deref(), Some(&b"second"[..]));
        assert!(kv.get("doc/3").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_kv_discards_uncommitted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut kv = SqliteKv::open(&path).unwrap();
            kv.set("doc/1", b"kept").unwrap();
            kv.flush().unwrap();
            kv.set("doc/2", b"lost").unwrap();
        }
        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.get("doc/1").unwrap().as_deref(), Some(&b"kept"[..]));
        assert!(kv.get("doc/2").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_kv_overwrites_do_not_grow_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut kv = SqliteKv::open(&path).unwrap();
        let value = vec![7u8; 100];
        for round in 0..1000 {
            kv.set("doc/1", &value).unwrap();
            if round % 100 == 99 {
                kv.flush().unwrap();
            }
        }
        assert_eq!(kv.len().unwrap(), 1);
        assert!(std::fs::metadata(&path).unwrap().len() < 64 * 1024);
    }
}
