//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Writes open a transaction lazily; it is committed once more than
//! `transaction_size` writes have accumulated, or when [`Storage::commit`] is
//! called explicitly.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{PendingUrl, Record};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    transaction_size: usize,
    pending_writes: usize,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `transaction_size` - Writes allowed to accumulate before committing
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, transaction_size: usize) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            transaction_size,
            pending_writes: 0,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(transaction_size: usize) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            transaction_size,
            pending_writes: 0,
        })
    }

    /// Number of writes not yet committed
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    fn begin_if_needed(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Counts one write and commits when the transaction is full
    fn track_write(&mut self) -> StorageResult<()> {
        self.pending_writes += 1;
        if self.pending_writes > self.transaction_size {
            self.commit()?;
        }
        Ok(())
    }

    fn count(&self, table_sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(table_sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Storage for SqliteStorage {
    // ===== Records =====

    fn insert_record(&mut self, record: &Record) -> StorageResult<()> {
        let properties = serde_json::to_string(&record.properties)?;
        self.begin_if_needed()?;
        self.conn.execute(
            "INSERT INTO records (url, properties, scraped_at) VALUES (?1, ?2, ?3)",
            params![record.url, properties, Utc::now().to_rfc3339()],
        )?;
        self.track_write()
    }

    fn count_records(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM records")
    }

    // ===== Pending Item URLs =====

    fn insert_item_urls(&mut self, urls: &[String]) -> StorageResult<()> {
        if urls.is_empty() {
            return Ok(());
        }

        self.begin_if_needed()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT INTO item_urls (url, discovered_at) VALUES (?1, ?2)")?;
            for url in urls {
                stmt.execute(params![url, now])?;
            }
        }
        self.track_write()
    }

    fn delete_item_url(&mut self, url: &str) -> StorageResult<()> {
        self.begin_if_needed()?;
        self.conn
            .execute("DELETE FROM item_urls WHERE url = ?1", params![url])?;
        self.track_write()
    }

    fn deduplicate_item_urls(&mut self) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM item_urls WHERE id NOT IN (SELECT MIN(id) FROM item_urls GROUP BY url)",
            [],
        )?;
        if removed > 0 {
            tracing::info!("Removed {} duplicate item URLs", removed);
        }
        Ok(removed)
    }

    fn pending_item_urls_page(&self, before: Option<i64>, limit: usize) -> StorageResult<Vec<PendingUrl>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, url FROM item_urls WHERE (?1 IS NULL OR id < ?1) ORDER BY id DESC LIMIT ?2",
        )?;
        let page = stmt
            .query_map(params![before, limit as i64], |row| {
                Ok(PendingUrl {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(page)
    }

    fn count_pending(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM item_urls")
    }

    // ===== Transactions =====

    fn commit(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            self.pending_writes = 0;
            return Ok(());
        }

        let writes = self.pending_writes;
        self.pending_writes = 0;

        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                tracing::info!("Committed {} writes", writes);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Commit of {} writes failed, rolling back: {}", writes, e);
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::error!("Rollback failed: {}", rollback);
                }
                Err(e.into())
            }
        }
    }
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            tracing::warn!(
                "Dropping storage with {} uncommitted writes",
                self.pending_writes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pending_urls_newest_first() {
        let mut storage = SqliteStorage::new_in_memory(100).unwrap();
        storage.insert_item_urls(&urls(&["a", "b"])).unwrap();
        storage.insert_item_urls(&urls(&["c"])).unwrap();

        assert_eq!(storage.pending_item_urls().unwrap(), urls(&["c", "b", "a"]));
    }

    #[test]
    fn test_pending_urls_deduplicated_keeping_oldest() {
        let mut storage = SqliteStorage::new_in_memory(100).unwrap();
        storage.insert_item_urls(&urls(&["a", "b", "a", "c", "b"])).unwrap();

        assert_eq!(storage.pending_item_urls().unwrap(), urls(&["c", "b", "a"]));
        assert_eq!(storage.count_pending().unwrap(), 3);
    }

    #[test]
    fn test_pending_pages_walk_newest_first() {
        let mut storage = SqliteStorage::new_in_memory(100).unwrap();
        storage.insert_item_urls(&urls(&["a", "b", "c", "d", "e"])).unwrap();

        let first = storage.pending_item_urls_page(None, 2).unwrap();
        let names: Vec<_> = first.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(names, vec!["e", "d"]);

        // Deleting behind the cursor does not shift the next page
        storage.delete_item_url("e").unwrap();
        let second = storage.pending_item_urls_page(Some(first[1].id), 2).unwrap();
        let names: Vec<_> = second.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);

        let last = storage.pending_item_urls_page(Some(second[1].id), 2).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].url, "a");
        assert!(storage.pending_item_urls_page(Some(last[0].id), 2).unwrap().is_empty());
    }

    #[test]
    fn test_delete_item_url_removes_every_copy() {
        let mut storage = SqliteStorage::new_in_memory(100).unwrap();
        storage.insert_item_urls(&urls(&["a", "a", "b"])).unwrap();

        storage.delete_item_url("a").unwrap();

        assert_eq!(storage.pending_item_urls().unwrap(), urls(&["b"]));
    }

    #[test]
    fn test_insert_record() {
        let mut storage = SqliteStorage::new_in_memory(100).unwrap();
        let record = Record::new("http://example.com/posts/1").with("h1", "Post 1");

        storage.insert_record(&record).unwrap();
        storage.commit().unwrap();

        assert_eq!(storage.count_records().unwrap(), 1);
        let stored: String = storage
            .conn
            .query_row("SELECT properties FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, r#"{"h1":"Post 1"}"#);
    }

    #[test]
    fn test_commit_after_transaction_size() {
        let mut storage = SqliteStorage::new_in_memory(2).unwrap();

        storage.insert_item_urls(&urls(&["a"])).unwrap();
        storage.insert_item_urls(&urls(&["b"])).unwrap();
        assert_eq!(storage.pending_writes(), 2);
        assert!(!storage.conn.is_autocommit());

        storage.insert_item_urls(&urls(&["c"])).unwrap();
        assert_eq!(storage.pending_writes(), 0);
        assert!(storage.conn.is_autocommit());
    }

    #[test]
    fn test_commit_without_writes_is_noop() {
        let mut storage = SqliteStorage::new_in_memory(2).unwrap();
        assert!(storage.commit().is_ok());
        assert!(storage.commit().is_ok());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");

        {
            let mut storage = SqliteStorage::new(&path, 100).unwrap();
            storage.insert_item_urls(&urls(&["a", "b"])).unwrap();
            storage
                .insert_record(&Record::new("x").with("h1", "X"))
                .unwrap();
            storage.commit().unwrap();
        }

        let mut storage = SqliteStorage::new(&path, 100).unwrap();
        assert_eq!(storage.pending_item_urls().unwrap(), urls(&["b", "a"]));
        assert_eq!(storage.count_records().unwrap(), 1);
    }

    #[test]
    fn test_uncommitted_writes_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");

        {
            let mut storage = SqliteStorage::new(&path, 100).unwrap();
            storage.insert_item_urls(&urls(&["a"])).unwrap();
        }

        let storage = SqliteStorage::new(&path, 100).unwrap();
        assert_eq!(storage.count_pending().unwrap(), 0);
    }
}
