//! Lifecycle controller
//!
//! Nothing in the pipeline knows when the last URL has gone through, so a
//! controller samples the shared state at a fixed interval:
//! - queues empty and every stage idle: broadcast `Exit` to all three queues
//! - the same, but the producer holds a partial batch: push one `Flush`
//! - otherwise report progress

use crate::fetch::FetchResult;
use crate::pipeline::queue::{Signal, StageSender};
use crate::pipeline::state::PipelineState;
use crate::site::Extracted;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Running,
    Flushing,
    Terminated,
}

pub struct LifecycleController {
    state: Arc<PipelineState>,
    work: StageSender<String>,
    responses: StageSender<FetchResult>,
    data: StageSender<Extracted>,
    poll_interval: Duration,
    phase: LifecyclePhase,
}

impl LifecycleController {
    pub fn new(
        state: Arc<PipelineState>,
        work: StageSender<String>,
        responses: StageSender<FetchResult>,
        data: StageSender<Extracted>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state,
            work,
            responses,
            data,
            poll_interval,
            phase: LifecyclePhase::Running,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Polls until the pipeline terminates or `halt` turns true
    pub async fn run(mut self, mut halt: watch::Receiver<bool>) -> LifecyclePhase {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick() == LifecyclePhase::Terminated {
                        break;
                    }
                }
                changed = halt.changed() => {
                    if changed.is_err() || *halt.borrow() {
                        tracing::warn!("Lifecycle controller halted");
                        break;
                    }
                }
            }
        }

        self.phase
    }

    /// Samples the state once and acts on it
    pub fn tick(&mut self) -> LifecyclePhase {
        if self.phase == LifecyclePhase::Terminated {
            return self.phase;
        }

        let snapshot = self.state.snapshot();
        if !snapshot.is_idle() {
            self.phase = LifecyclePhase::Running;
            self.report_progress();
            return self.phase;
        }

        // Act only if a second sample shows nothing happened in between
        if self.state.snapshot() != snapshot {
            self.report_progress();
            return self.phase;
        }

        if snapshot.batch_non_empty {
            tracing::info!("Dumping URLs batch");
            self.work.send(Signal::Flush);
            self.phase = LifecyclePhase::Flushing;
        } else {
            self.exit_workers();
            self.phase = LifecyclePhase::Terminated;
        }

        self.phase
    }

    fn exit_workers(&self) {
        tracing::info!("Exiting workers");
        self.work.send(Signal::Exit);
        self.responses.send(Signal::Exit);
        self.data.send(Signal::Exit);
    }

    fn report_progress(&self) {
        let counters = self.state.counters();
        let total = counters.to_process();
        if total == 0 {
            return;
        }

        let processed = counters.processed();
        tracing::info!(
            "Processed {} ({:.2}%) URLs",
            processed,
            processed as f64 / total as f64 * 100.0
        );
    }
}
