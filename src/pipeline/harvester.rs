//! The two harvesting phases

use crate::partition::RangeSource;
use crate::pipeline::coordinator::{Pipeline, RunSummary};
use crate::pipeline::producer::rotate;
use crate::storage::{run_blocking, PendingUrls};
use crate::Result;
use std::net::IpAddr;

/// Pending item URLs read from storage at a time
const PENDING_PAGE_SIZE: usize = 1000;

/// Collects item URLs from listing pages, then item properties from item pages
pub struct Harvester {
    pipeline: Pipeline,
    ranges: RangeSource,
}

impl Harvester {
    pub fn new(pipeline: Pipeline, ranges: RangeSource) -> Self {
        Self { pipeline, ranges }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Rotates once so that not even the first batch leaves through the current address
    pub async fn prepare(&self) -> Result<IpAddr> {
        Ok(rotate(self.pipeline.rotator().as_ref()).await?)
    }

    /// Phase one: fetch this worker's listing pages and store discovered item URLs
    pub async fn collect_list_urls(&self) -> Result<RunSummary> {
        let range = self.ranges.fetch().await?;
        if range.is_empty() {
            tracing::info!("No listing pages left to harvest");
            return Ok(RunSummary {
                urls_to_process: 0,
                urls_processed: 0,
            });
        }

        tracing::info!("Harvesting listing range ({}, {})", range.start, range.end);
        let urls = self.pipeline.site().generate_list_urls(range);
        self.pipeline.run("URLs", range.len(), urls).await
    }

    /// Phase two: fetch every pending item URL, newest first, and store its record
    pub async fn collect_item_properties(&self) -> Result<RunSummary> {
        let storage = self.pipeline.storage().clone();
        let total = run_blocking(storage.clone(), |storage| {
            storage.deduplicate_item_urls()?;
            storage.count_pending()
        })
        .await?;

        let urls = PendingUrls::new(storage, PENDING_PAGE_SIZE);
        self.pipeline.run("properties", total, Box::new(urls)).await
    }

    /// Runs both phases
    pub async fn harvest(&self) -> Result<(RunSummary, RunSummary)> {
        let lists = self.collect_list_urls().await?;
        let items = self.collect_item_properties().await?;
        Ok((lists, items))
    }
}
