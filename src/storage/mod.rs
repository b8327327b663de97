//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The pending item URL table (deduplicated, handed out newest-first a page at a time)
//! - The extracted record table
//! - Transaction batching with rollback on commit failure
//! - A hybrid backend keeping URLs locally and forwarding records to the
//!   distributed controller

mod pending;
mod remote;
mod schema;
mod sqlite;
mod traits;

pub use pending::{PendingUrl, PendingUrls};
pub use remote::HybridStorage;
pub use sqlite::SqliteStorage;
pub use traits::{lock_storage, SharedStorage, Storage, StorageError, StorageResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Opens (or creates) a local SQLite store
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `transaction_size` - Writes allowed to accumulate before committing
pub fn open_storage(path: &Path, transaction_size: usize) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path, transaction_size)
}

/// Wraps a storage backend for sharing between pipeline stages
pub fn share<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs a storage operation on the blocking thread pool
///
/// SQLite calls block, so async code reaches storage only through here.
pub async fn run_blocking<T, F>(storage: SharedStorage, op: F) -> crate::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Storage) -> StorageResult<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = lock_storage(&storage)?;
        op(&mut *guard)
    })
    .await
    .map_err(|e| crate::HarvestError::Worker(e.to_string()))?;

    Ok(result?)
}

/// Properties extracted from one item page
///
/// `url` is bookkeeping: it identifies the pending item URL to remove once the
/// record has been handled. A record with no properties is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub url: String,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Record {
    /// Creates a record with no properties yet
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            properties: Map::new(),
        }
    }

    /// Adds a property, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns true if anything besides the URL was extracted
    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}
