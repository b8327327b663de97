//! Hybrid storage for distributed workers
//!
//! Item URLs stay in the worker's local SQLite database, while records are
//! forwarded to the controller so all workers feed one shared store.

use crate::controller::ControllerClient;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{PendingUrl, Record, SqliteStorage};
use tokio::runtime::Handle;

/// Local URL bookkeeping plus remote record storage
///
/// Remote calls are driven with [`Handle::block_on`], so the record and commit
/// methods must be called from a blocking thread (the persister stage runs on
/// one), never from inside an async task.
pub struct HybridStorage {
    local: SqliteStorage,
    client: ControllerClient,
    runtime: Handle,
}

impl HybridStorage {
    pub fn new(local: SqliteStorage, client: ControllerClient, runtime: Handle) -> Self {
        Self {
            local,
            client,
            runtime,
        }
    }
}

fn remote_error(e: crate::HarvestError) -> StorageError {
    StorageError::Remote(e.to_string())
}

impl Storage for HybridStorage {
    fn insert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.runtime
            .block_on(self.client.insert_record(record))
            .map_err(remote_error)
    }

    /// Only records kept locally are counted; the remote store is not queried
    fn count_records(&self) -> StorageResult<u64> {
        self.local.count_records()
    }

    fn insert_item_urls(&mut self, urls: &[String]) -> StorageResult<()> {
        self.local.insert_item_urls(urls)
    }

    fn delete_item_url(&mut self, url: &str) -> StorageResult<()> {
        self.local.delete_item_url(url)
    }

    fn deduplicate_item_urls(&mut self) -> StorageResult<usize> {
        self.local.deduplicate_item_urls()
    }

    fn pending_item_urls_page(&self, before: Option<i64>, limit: usize) -> StorageResult<Vec<PendingUrl>> {
        self.local.pending_item_urls_page(before, limit)
    }

    fn count_pending(&self) -> StorageResult<u64> {
        self.local.count_pending()
    }

    fn commit(&mut self) -> StorageResult<()> {
        let remote = self
            .runtime
            .block_on(self.client.commit())
            .map_err(remote_error);
        self.local.commit()?;
        remote
    }
}
