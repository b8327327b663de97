//! Shared pipeline state
//!
//! Queue depths and stage activity flags live behind one lock so the
//! lifecycle controller always reads a consistent picture. Hand-offs keep
//! every unit of work visible: a consumer raises its flag in the same update
//! that lowers the queue depth, and pushes downstream before lowering it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The three stage queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// URLs waiting to be fetched
    Work,

    /// Fetch results waiting for extraction
    Responses,

    /// Extracted items waiting to be persisted
    Data,
}

/// Stage activity flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    /// The URL generator still has URLs to feed
    Producing,

    /// The producer holds a drained batch that has not been dispatched yet
    Batching,

    /// A batch is being fetched, classified or followed by a rotation
    Requesting,

    Extracting,

    Persisting,
}

/// A consistent view of queue depths and stage flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub work: usize,
    pub responses: usize,
    pub data: usize,
    pub producing: bool,
    pub batch_non_empty: bool,
    pub requesting: bool,
    pub extracting: bool,
    pub persisting: bool,

    /// Bumped on every change
    pub epoch: u64,
}

impl Snapshot {
    pub fn queues_empty(&self) -> bool {
        self.work == 0 && self.responses == 0 && self.data == 0
    }

    pub fn workers_idle(&self) -> bool {
        !self.producing && !self.requesting && !self.extracting && !self.persisting
    }

    /// Nothing queued and nobody working; a partial batch may still be held
    pub fn is_idle(&self) -> bool {
        self.queues_empty() && self.workers_idle()
    }

    fn depth_mut(&mut self, stage: Stage) -> &mut usize {
        match stage {
            Stage::Work => &mut self.work,
            Stage::Responses => &mut self.responses,
            Stage::Data => &mut self.data,
        }
    }

    fn flag_mut(&mut self, activity: Activity) -> &mut bool {
        match activity {
            Activity::Producing => &mut self.producing,
            Activity::Batching => &mut self.batch_non_empty,
            Activity::Requesting => &mut self.requesting,
            Activity::Extracting => &mut self.extracting,
            Activity::Persisting => &mut self.persisting,
        }
    }
}

/// Progress counters, for observability only
#[derive(Debug, Default)]
pub struct PipelineCounters {
    urls_to_process: AtomicU64,
    urls_processed: AtomicU64,
}

impl PipelineCounters {
    pub fn set_to_process(&self, total: u64) {
        self.urls_to_process.store(total, Ordering::Relaxed);
    }

    pub fn mark_processed(&self) {
        self.urls_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_process(&self) -> u64 {
        self.urls_to_process.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.urls_processed.load(Ordering::Relaxed)
    }
}

/// State shared by every stage of one pipeline run
#[derive(Debug)]
pub struct PipelineState {
    snapshot: Mutex<Snapshot>,
    counters: PipelineCounters,
}

impl PipelineState {
    /// Creates the state for a new run; the generator starts out producing
    pub fn new() -> Arc<Self> {
        let snapshot = Snapshot {
            producing: true,
            ..Snapshot::default()
        };

        Arc::new(Self {
            snapshot: Mutex::new(snapshot),
            counters: PipelineCounters::default(),
        })
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    /// Reads all depths and flags at once
    pub fn snapshot(&self) -> Snapshot {
        *self.lock()
    }

    /// Applies a change and bumps the epoch
    pub fn update(&self, change: impl FnOnce(&mut Snapshot)) {
        let mut snapshot = self.lock();
        change(&mut snapshot);
        snapshot.epoch += 1;
    }

    pub fn enqueued(&self, stage: Stage) {
        self.update(|s| *s.depth_mut(stage) += 1);
    }

    /// Lowers a queue depth, raising `activity` in the same update
    pub fn dequeued(&self, stage: Stage, activity: Option<Activity>) {
        self.update(|s| {
            let depth = s.depth_mut(stage);
            *depth = depth.saturating_sub(1);
            if let Some(activity) = activity {
                *s.flag_mut(activity) = true;
            }
        });
    }

    pub fn set(&self, activity: Activity, value: bool) {
        self.update(|s| *s.flag_mut(activity) = value);
    }

    /// Raises `activity` until the returned guard is dropped
    pub fn raise(self: &Arc<Self>, activity: Activity) -> ActivityGuard {
        self.set(activity, true);
        ActivityGuard::new(Arc::clone(self), Some(activity))
    }

    /// Turns the held batch into a request in one update
    pub fn begin_request(self: &Arc<Self>) -> ActivityGuard {
        self.update(|s| {
            s.batch_non_empty = false;
            s.requesting = true;
        });
        ActivityGuard::new(Arc::clone(self), Some(Activity::Requesting))
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears an activity flag when dropped
#[must_use = "the activity flag is cleared as soon as the guard is dropped"]
pub struct ActivityGuard {
    state: Arc<PipelineState>,
    activity: Option<Activity>,
}

impl ActivityGuard {
    pub(crate) fn new(state: Arc<PipelineState>, activity: Option<Activity>) -> Self {
        Self { state, activity }
    }

    /// Leaves the flag raised; someone else lowers it
    pub fn disarm(mut self) {
        self.activity = None;
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Some(activity) = self.activity.take() {
            self.state.set(activity, false);
        }
    }
}
