//! Pipeline wiring and run orchestration
//!
//! A run starts the extractor and persister on blocking threads and the
//! lifecycle controller as a task, then drives the producer on the calling
//! task until the controller (or a fatal rotation error) stops it.

use crate::config::{PipelineConfig, RotationMode};
use crate::fetch::{Classify, Fetch, FetchResult, StatusClassifier};
use crate::pipeline::extractor::Extractor;
use crate::pipeline::lifecycle::{LifecycleController, LifecyclePhase};
use crate::pipeline::persister::Persister;
use crate::pipeline::producer::{Producer, UrlGenerator};
use crate::pipeline::queue::{stage_queue, Signal};
use crate::pipeline::state::{PipelineState, Stage};
use crate::rotation::IpRotator;
use crate::site::{Extracted, SiteCapability};
use crate::storage::SharedStorage;
use crate::{HarvestError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;

/// Outcome of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub urls_to_process: u64,
    pub urls_processed: u64,
}

/// The staged harvesting pipeline
pub struct Pipeline {
    fetcher: Arc<dyn Fetch>,
    classifier: Arc<dyn Classify>,
    rotator: Arc<dyn IpRotator>,
    site: Arc<dyn SiteCapability>,
    storage: SharedStorage,
    workers: usize,
    poll_interval: Duration,
    rotation: RotationMode,
}

impl Pipeline {
    /// Creates a pipeline using the configured retry policy and rotation mode
    pub fn new(
        config: &PipelineConfig,
        fetcher: Arc<dyn Fetch>,
        rotator: Arc<dyn IpRotator>,
        site: Arc<dyn SiteCapability>,
        storage: SharedStorage,
    ) -> Self {
        Self {
            fetcher,
            classifier: Arc::new(StatusClassifier::from_config(config)),
            rotator,
            site,
            storage,
            workers: config.workers_count,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            rotation: config.rotation,
        }
    }

    /// Replaces the retry classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn Classify>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn site(&self) -> &Arc<dyn SiteCapability> {
        &self.site
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn rotator(&self) -> &Arc<dyn IpRotator> {
        &self.rotator
    }

    /// Runs the pipeline over `urls` until every URL has been handled
    ///
    /// # Arguments
    ///
    /// * `target` - What is being collected, for logging
    /// * `total` - Expected number of URLs, for progress reporting
    /// * `urls` - Lazily generated URLs
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run terminated normally
    /// * `Err(HarvestError)` - Rotation halted the run, or a stage failed
    pub async fn run(&self, target: &str, total: u64, urls: UrlGenerator) -> Result<RunSummary> {
        tracing::info!("Collecting item {}", target);
        tracing::info!("URLs to process: {}", total);

        let state = PipelineState::new();
        state.counters().set_to_process(total);

        let (work, work_rx) = stage_queue::<String>(Stage::Work, &state);
        let (responses, responses_rx) = stage_queue::<FetchResult>(Stage::Responses, &state);
        let (data, data_rx) = stage_queue::<Extracted>(Stage::Data, &state);

        let extractor = Extractor::new(Arc::clone(&self.site), Arc::clone(&state));
        let extractor_data = data.clone();
        let mut extractor_handle =
            tokio::task::spawn_blocking(move || extractor.run(responses_rx, extractor_data));

        let persister = Persister::new(Arc::clone(&self.storage), Arc::clone(&state));
        let mut persister_handle = tokio::task::spawn_blocking(move || persister.run(data_rx));

        let (halt_tx, halt_rx) = watch::channel(false);
        let controller = LifecycleController::new(
            Arc::clone(&state),
            work.clone(),
            responses.clone(),
            data.clone(),
            self.poll_interval,
        );
        let controller_handle = tokio::spawn(controller.run(halt_rx));

        let producer = Producer::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.classifier),
            Arc::clone(&self.rotator),
            Arc::clone(&state),
            self.workers,
        )
        .with_rotation(self.rotation);
        let producing = producer.run(urls, work_rx, &work, &responses);
        tokio::pin!(producing);

        // A stage may finish cleanly on the controller's Exit before the
        // producer does; only a stage that died stops the run early
        let mut extracted = None;
        let mut persisted = None;
        let produced: Result<()> = loop {
            tokio::select! {
                produced = &mut producing => break produced.map_err(HarvestError::from),
                joined = &mut extractor_handle, if extracted.is_none() => {
                    let died = joined.is_err();
                    extracted = Some(joined);
                    if died {
                        break Err(HarvestError::Worker("Extractor stage died".to_string()));
                    }
                }
                joined = &mut persister_handle, if persisted.is_none() => {
                    let died = joined.is_err();
                    persisted = Some(joined);
                    if died {
                        break Err(HarvestError::Worker("Persister stage died".to_string()));
                    }
                }
            }
        };

        if let Err(e) = &produced {
            tracing::error!("Halting {} run: {}", target, e);
            // Wind down in order so nothing already fetched is lost
            let _ = halt_tx.send(true);
            responses.send(Signal::Exit);
        }

        let phase = controller_handle.await.map_err(worker_failed)?;
        let extracted = match extracted {
            Some(joined) => joined,
            None => extractor_handle.await,
        };
        if phase != LifecyclePhase::Terminated {
            data.send(Signal::Exit);
        }
        let persisted = match persisted {
            Some(joined) => joined,
            None => persister_handle.await,
        };

        extracted.map_err(worker_failed)?;
        let persisted = persisted.map_err(worker_failed)?;
        produced?;
        if let Err(e) = persisted {
            tracing::error!("Final commit failed: {}", e);
        }

        let summary = RunSummary {
            urls_to_process: total,
            urls_processed: state.counters().processed(),
        };
        tracing::info!(
            "Finished collecting item {}: processed {} of {} URLs",
            target,
            summary.urls_processed,
            summary.urls_to_process
        );
        Ok(summary)
    }
}

fn worker_failed(e: JoinError) -> HarvestError {
    HarvestError::Worker(e.to_string())
}
