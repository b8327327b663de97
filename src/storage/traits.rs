//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{PendingUrl, Record};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage backend panicked: {0}")]
    Panicked(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A storage backend shared between pipeline stages
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Locks a shared storage, mapping lock poisoning to a storage error
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Trait for storage backend implementations
///
/// Writes are buffered in a transaction; implementations decide when to
/// commit on their own (by transaction size) and on explicit [`Storage::commit`].
pub trait Storage: Send {
    // ===== Records =====

    /// Stores one extracted record
    fn insert_record(&mut self, record: &Record) -> StorageResult<()>;

    /// Counts stored records
    fn count_records(&self) -> StorageResult<u64>;

    // ===== Pending Item URLs =====

    /// Stores a batch of discovered item URLs
    fn insert_item_urls(&mut self, urls: &[String]) -> StorageResult<()>;

    /// Removes a processed item URL
    fn delete_item_url(&mut self, url: &str) -> StorageResult<()>;

    /// Removes duplicate pending item URLs, keeping the oldest copy of each
    ///
    /// Returns how many rows were removed.
    fn deduplicate_item_urls(&mut self) -> StorageResult<usize>;

    /// Reads up to `limit` pending item URLs, newest first
    ///
    /// With `before` set, only URLs discovered before that id are returned,
    /// so pages stay stable while earlier URLs are being deleted.
    fn pending_item_urls_page(&self, before: Option<i64>, limit: usize) -> StorageResult<Vec<PendingUrl>>;

    /// Deduplicates the pending item URLs and returns all of them newest-first
    fn pending_item_urls(&mut self) -> StorageResult<Vec<String>> {
        self.deduplicate_item_urls()?;

        let mut urls = Vec::new();
        let mut before = None;
        loop {
            let page = self.pending_item_urls_page(before, 1000)?;
            match page.last() {
                Some(last) => before = Some(last.id),
                None => break,
            }
            urls.extend(page.into_iter().map(|pending| pending.url));
        }
        Ok(urls)
    }

    /// Counts pending item URLs
    fn count_pending(&self) -> StorageResult<u64>;

    // ===== Transactions =====

    /// Commits buffered writes; a failed commit is rolled back
    fn commit(&mut self) -> StorageResult<()>;
}
