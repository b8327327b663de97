//! Extractor stage: responses → data

use crate::fetch::FetchResult;
use crate::pipeline::isolate::isolate_panic;
use crate::pipeline::queue::{Signal, StageReceiver, StageSender};
use crate::pipeline::state::{Activity, PipelineState};
use crate::site::{extract, Extracted, SiteCapability};
use std::sync::Arc;

pub struct Extractor {
    site: Arc<dyn SiteCapability>,
    state: Arc<PipelineState>,
}

impl Extractor {
    pub fn new(site: Arc<dyn SiteCapability>, state: Arc<PipelineState>) -> Self {
        Self { site, state }
    }

    /// Consumes responses until `Exit`; meant for a blocking thread
    pub fn run(&self, mut responses: StageReceiver<FetchResult>, data: StageSender<Extracted>) {
        while let Some((signal, _extracting)) = responses.blocking_recv(Activity::Extracting) {
            match signal {
                Signal::Data(page) => self.handle(&page, &data),
                Signal::Flush => {}
                Signal::Exit => break,
            }
        }
        tracing::debug!("Extractor stopped");
    }

    fn handle(&self, page: &FetchResult, data: &StageSender<Extracted>) {
        match isolate_panic(|| extract(self.site.as_ref(), page)) {
            Ok(Ok(extracted)) => {
                data.push(extracted);
            }
            Ok(Err(e)) => {
                tracing::error!("Failed processing response for {}: {}", page.url, e);
                self.state.counters().mark_processed();
            }
            Err(panic) => {
                tracing::error!("Site panicked processing {}: {}", page.url, panic);
                self.state.counters().mark_processed();
            }
        }
    }
}
