//! Persister stage: data → storage

use crate::pipeline::isolate::isolate_panic;
use crate::pipeline::queue::{Signal, StageReceiver};
use crate::pipeline::state::{Activity, PipelineState};
use crate::site::Extracted;
use crate::storage::{lock_storage, SharedStorage, Storage, StorageError, StorageResult};
use std::sync::Arc;

pub struct Persister {
    storage: SharedStorage,
    state: Arc<PipelineState>,
}

impl Persister {
    pub fn new(storage: SharedStorage, state: Arc<PipelineState>) -> Self {
        Self { storage, state }
    }

    /// Consumes extracted items until `Exit`, then commits; meant for a blocking thread
    pub fn run(&self, mut data: StageReceiver<Extracted>) -> StorageResult<()> {
        while let Some((signal, _persisting)) = data.blocking_recv(Activity::Persisting) {
            match signal {
                Signal::Data(extracted) => self.handle(extracted),
                Signal::Flush => {}
                Signal::Exit => break,
            }
        }

        let result = lock_storage(&self.storage)?.commit();
        tracing::debug!("Persister stopped");
        result
    }

    fn handle(&self, extracted: Extracted) {
        if let Err(e) = self.store(&extracted) {
            tracing::error!("Failed storing data: {}", e);
        }
        self.state.counters().mark_processed();
    }

    /// Stores discovered URLs, or stores a record and retires its pending URL
    ///
    /// A record without properties is not stored but its URL is still removed.
    /// When inserting fails the URL stays pending for a later pass. A panicking
    /// backend is reported as an error while the lock stays held, so the shared
    /// storage is not poisoned for the items behind it.
    fn store(&self, extracted: &Extracted) -> StorageResult<()> {
        let mut storage = lock_storage(&self.storage)?;
        isolate_panic(|| write(&mut *storage, extracted))
            .unwrap_or_else(|panic| Err(StorageError::Panicked(panic)))
    }
}

fn write(storage: &mut dyn Storage, extracted: &Extracted) -> StorageResult<()> {
    match extracted {
        Extracted::ItemUrls(urls) => {
            if !urls.is_empty() {
                storage.insert_item_urls(urls)?;
            }
        }
        Extracted::Record(record) => {
            if record.has_properties() {
                storage.insert_record(record)?;
            }
            storage.delete_item_url(&record.url)?;
        }
    }
    Ok(())
}
