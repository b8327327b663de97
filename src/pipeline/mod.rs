//! The staged harvesting pipeline
//!
//! ```text
//! generator ─▶ work ─▶ Producer (fetch W at a time, rotate) ─▶ responses
//!                ▲                  │ retry                        │
//!                └──────────────────┘                              ▼
//!          storage ◀─ Persister ◀─ data ◀─ Extractor ◀─────────────┘
//! ```
//!
//! A [`LifecycleController`] watches queue depths and stage activity and
//! decides when to flush a partial batch and when to stop every stage.

mod coordinator;
mod extractor;
mod harvester;
mod isolate;
mod lifecycle;
mod persister;
mod producer;
mod queue;
mod state;

pub use coordinator::{Pipeline, RunSummary};
pub use extractor::Extractor;
pub use harvester::Harvester;
pub use lifecycle::{LifecycleController, LifecyclePhase};
pub use persister::Persister;
pub use producer::{rotate, Producer, UrlGenerator};
pub use queue::{stage_queue, Signal, StageReceiver, StageSender};
pub use state::{Activity, ActivityGuard, PipelineCounters, PipelineState, Snapshot, Stage};
