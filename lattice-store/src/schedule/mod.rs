//! Update Scheduling
//!
//! Mutations never notify anybody directly. Instead, the first mutation in a
//! turn opens a [`Frame`] and defers a flush through a [`Scheduler`]; every
//! further mutation in the same turn joins that frame. When the flush runs:
//!
//! 1. Computed properties whose inputs changed are recomputed, lowest
//!    priority first, so that a computed always sees the fresh values of the
//!    computeds it reads. A recompute that changes its value joins the same
//!    frame and may pull in further recomputes.
//! 2. Once nothing is left to recompute, every other listener touched by the
//!    frame runs exactly once, receiving the complete list of changed keys.
//! 3. Anyone awaiting the frame is resolved with it.
//!
//! # Design Decisions
//!
//! 1. The scheduler is a seam, not a runtime. Stores only ever ask it to run
//!    one task "later". [`TaskQueue`] does this with an explicit queue that
//!    the host drains; [`TokioScheduler`] spawns onto a tokio runtime so the
//!    flush runs at the next await point.
//!
//! 2. Exactly one task is deferred per idle -> batching transition.

mod frame;
mod queue;

pub use frame::Frame;
pub(crate) use frame::Batch;
pub use queue::{default_scheduler, flush, Scheduler, Task, TaskQueue, TokioScheduler};
