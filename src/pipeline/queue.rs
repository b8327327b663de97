//! Stage queues with control signals
//!
//! Each queue is an unbounded tokio channel whose depth is mirrored in
//! [`PipelineState`]. Sentinels count towards the depth like data does.

use crate::pipeline::state::{Activity, ActivityGuard, PipelineState, Stage};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A queue message
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Data(T),

    /// Ends the producer's current batch without waiting for it to fill
    Flush,

    /// Stops the receiving stage
    Exit,
}

/// Creates a queue for `stage`
pub fn stage_queue<T>(stage: Stage, state: &Arc<PipelineState>) -> (StageSender<T>, StageReceiver<T>) {
    let (tx, rx) = unbounded_channel();
    (
        StageSender {
            stage,
            tx,
            state: Arc::clone(state),
        },
        StageReceiver {
            stage,
            rx,
            state: Arc::clone(state),
        },
    )
}

pub struct StageSender<T> {
    stage: Stage,
    tx: UnboundedSender<Signal<T>>,
    state: Arc<PipelineState>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> StageSender<T> {
    /// Enqueues a signal; returns false if the receiving stage is gone
    pub fn send(&self, signal: Signal<T>) -> bool {
        self.state.enqueued(self.stage);
        if self.tx.send(signal).is_err() {
            self.state.dequeued(self.stage, None);
            tracing::warn!("{:?} queue closed, message dropped", self.stage);
            return false;
        }
        true
    }

    pub fn push(&self, item: T) -> bool {
        self.send(Signal::Data(item))
    }
}

pub struct StageReceiver<T> {
    stage: Stage,
    rx: UnboundedReceiver<Signal<T>>,
    state: Arc<PipelineState>,
}

impl<T> StageReceiver<T> {
    /// Waits for the next signal
    ///
    /// For data, `activity` is raised in the same update that lowers the depth
    /// and stays raised until the returned guard is dropped. Returns None once
    /// every sender is gone.
    pub async fn recv(&mut self, activity: Activity) -> Option<(Signal<T>, ActivityGuard)> {
        let signal = self.rx.recv().await?;
        Some(self.acknowledge(signal, activity))
    }

    /// Blocking variant of [`StageReceiver::recv`] for stages on blocking threads
    pub fn blocking_recv(&mut self, activity: Activity) -> Option<(Signal<T>, ActivityGuard)> {
        let signal = self.rx.blocking_recv()?;
        Some(self.acknowledge(signal, activity))
    }

    fn acknowledge(&self, signal: Signal<T>, activity: Activity) -> (Signal<T>, ActivityGuard) {
        let raised = matches!(signal, Signal::Data(_)).then_some(activity);
        self.state.dequeued(self.stage, raised);
        (signal, ActivityGuard::new(Arc::clone(&self.state), raised))
    }
}
