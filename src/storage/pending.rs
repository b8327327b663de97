//! Lazy hand-out of pending item URLs

use crate::storage::traits::{lock_storage, SharedStorage, StorageResult};
use std::collections::VecDeque;

/// A pending item URL and its discovery id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUrl {
    pub id: i64,
    pub url: String,
}

/// Yields pending item URLs newest-first, reading one page at a time
///
/// Pages are keyed on the last id handed out, so URLs retired by the
/// persister while the iteration runs never make it skip one. A read error
/// is logged and ends the sequence.
pub struct PendingUrls {
    storage: SharedStorage,
    page_size: usize,
    before: Option<i64>,
    page: VecDeque<String>,
    exhausted: bool,
}

impl PendingUrls {
    pub fn new(storage: SharedStorage, page_size: usize) -> Self {
        Self {
            storage,
            page_size: page_size.max(1),
            before: None,
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) -> StorageResult<()> {
        let page = lock_storage(&self.storage)?.pending_item_urls_page(self.before, self.page_size)?;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.before = Some(last.id);
        }
        self.page.extend(page.into_iter().map(|pending| pending.url));
        Ok(())
    }
}

impl Iterator for PendingUrls {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                tracing::error!("Failed reading pending item URLs: {}", e);
                self.exhausted = true;
            }
        }
        self.page.pop_front()
    }
}
