//! Producer stage: generator → work → fetch → responses
//!
//! Every iteration feeds up to W URLs from the generator into the work queue,
//! drains up to W URLs back out as a batch, fetches the batch concurrently,
//! classifies the results and rotates the exit address before the next batch.
//! With [`RotationMode::OnDemand`] it rotates only after a batch in which the
//! classifier asked for a fresh address.

use crate::config::RotationMode;
use crate::fetch::{Classify, Disposition, Fetch, FetchResult};
use crate::pipeline::queue::{Signal, StageReceiver, StageSender};
use crate::pipeline::state::{Activity, PipelineState};
use crate::rotation::{IpRotator, RotationError};
use std::net::IpAddr;
use std::sync::Arc;

/// Lazily generated URLs for one run
pub type UrlGenerator = Box<dyn Iterator<Item = String> + Send>;

pub struct Producer {
    fetcher: Arc<dyn Fetch>,
    classifier: Arc<dyn Classify>,
    rotator: Arc<dyn IpRotator>,
    state: Arc<PipelineState>,
    workers: usize,
    rotation: RotationMode,
}

/// How a batch drain ended
enum Drain {
    Full,
    Flushed,
    Exited,
}

impl Producer {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        classifier: Arc<dyn Classify>,
        rotator: Arc<dyn IpRotator>,
        state: Arc<PipelineState>,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            rotator,
            state,
            workers: workers.max(1),
            rotation: RotationMode::EveryBatch,
        }
    }

    pub fn with_rotation(mut self, rotation: RotationMode) -> Self {
        self.rotation = rotation;
        self
    }

    /// Runs until an `Exit` arrives on the work queue
    ///
    /// Only a fatal rotation error ends the loop early.
    pub async fn run(
        &self,
        mut urls: UrlGenerator,
        mut work_rx: StageReceiver<String>,
        work: &StageSender<String>,
        responses: &StageSender<FetchResult>,
    ) -> Result<(), RotationError> {
        let mut generator_done = false;

        loop {
            if !generator_done {
                generator_done = self.feed(&mut urls, work);
            }

            let mut batch = Vec::with_capacity(self.workers);
            let drain = self.drain(&mut work_rx, &mut batch).await;

            if !batch.is_empty() {
                let _requesting = self.state.begin_request();
                let requested = self.fetch_batch(batch, work, responses).await;
                if requested || self.rotation == RotationMode::EveryBatch {
                    rotate(self.rotator.as_ref()).await?;
                }
            }

            match drain {
                Drain::Exited => break,
                Drain::Full | Drain::Flushed => {}
            }
        }

        tracing::debug!("Producer stopped");
        Ok(())
    }

    /// Pushes up to W generated URLs; returns true once the generator is exhausted
    fn feed(&self, urls: &mut UrlGenerator, work: &StageSender<String>) -> bool {
        for _ in 0..self.workers {
            match urls.next() {
                Some(url) => {
                    work.push(url);
                }
                None => {
                    self.state.set(Activity::Producing, false);
                    return true;
                }
            }
        }
        false
    }

    async fn drain(&self, work_rx: &mut StageReceiver<String>, batch: &mut Vec<String>) -> Drain {
        while batch.len() < self.workers {
            match work_rx.recv(Activity::Batching).await {
                Some((Signal::Data(url), guard)) => {
                    // Lowered by `begin_request` once the batch is dispatched
                    guard.disarm();
                    batch.push(url);
                }
                Some((Signal::Flush, _)) => {
                    tracing::debug!("Flushing batch of {} URLs", batch.len());
                    return Drain::Flushed;
                }
                Some((Signal::Exit, _)) | None => return Drain::Exited,
            }
        }
        Drain::Full
    }

    /// Fetches and routes one batch; returns true if a result asked for rotation
    async fn fetch_batch(
        &self,
        batch: Vec<String>,
        work: &StageSender<String>,
        responses: &StageSender<FetchResult>,
    ) -> bool {
        let handles: Vec<_> = batch
            .into_iter()
            .map(|url| {
                let fetcher = Arc::clone(&self.fetcher);
                let task_url = url.clone();
                let handle = tokio::spawn(async move { fetcher.fetch(&task_url).await });
                (url, handle)
            })
            .collect();

        let mut rotation_requested = false;
        for (url, handle) in handles {
            match handle.await {
                Ok(result) => {
                    rotation_requested |= self.route(result, work, responses).requests_rotation();
                }
                Err(e) => {
                    tracing::error!("Fetch task for {} failed: {}", url, e);
                    work.push(url);
                }
            }
        }
        rotation_requested
    }

    fn route(
        &self,
        result: FetchResult,
        work: &StageSender<String>,
        responses: &StageSender<FetchResult>,
    ) -> Disposition {
        let disposition = self.classifier.classify(&result);
        match disposition {
            Disposition::Retry => {
                tracing::warn!("Retrying {} later (status {})", result.url, result.status);
                work.push(result.url);
            }
            Disposition::RetryAfterRotation => {
                tracing::warn!(
                    "Retrying {} through a new address (status {})",
                    result.url,
                    result.status
                );
                work.push(result.url);
            }
            Disposition::Extract => {
                responses.push(result);
            }
        }
        disposition
    }
}

/// Obtains a new exit address, retrying until one is found
///
/// Exhausting the attempt ceiling is logged and retried, since harvesting
/// through a used or real address is never acceptable. Fatal errors return.
pub async fn rotate(rotator: &dyn IpRotator) -> Result<IpAddr, RotationError> {
    loop {
        match rotator.get_new_ip().await {
            Ok(address) => {
                tracing::info!("New IP: {}", address);
                return Ok(address);
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Rotation halted: {}", e);
                return Err(e);
            }
            Err(e) => tracing::error!("Failed setting new IP: {}", e),
        }
    }
}
