//! Task Schedulers
//!
//! A scheduler runs a deferred flush at some later point on the same logical
//! thread of execution. Stores never block on it and never run more than one
//! flush per frame.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::{Error, Result};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs deferred tasks on behalf of a store.
pub trait Scheduler: Send + Sync {
    /// Queue `task` to run after the current turn completes.
    fn defer(&self, task: Task);
}

/// An explicit single-threaded task queue.
///
/// Tasks accumulate until the host calls [`TaskQueue::run_until_idle`].
/// Clones share the same queue.
///
/// # Example
///
/// ```rust,ignore
/// let queue = TaskQueue::new();
/// let model = timer.create_with(Config::with_scheduler(queue.clone()))?;
///
/// model.set("seconds", 60)?;
/// queue.run_until_idle(); // the frame is flushed here
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide queue used when no tokio runtime is available.
    ///
    /// Created on first use and never torn down.
    pub fn global() -> &'static TaskQueue {
        static GLOBAL: OnceLock<TaskQueue> = OnceLock::new();
        GLOBAL.get_or_init(TaskQueue::new)
    }

    /// Run queued tasks, including any queued while running, until the queue
    /// is empty. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;

        // Pop in its own statement: the guard must be gone before the task
        // runs, since tasks may defer more.
        loop {
            let Some(task) = self.tasks.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }

        ran
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Scheduler for TaskQueue {
    fn defer(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

/// Defers tasks onto a tokio runtime.
///
/// On a current-thread runtime the task runs the next time the caller awaits,
/// which gives the "same turn" batching stores expect. On a multi-thread
/// runtime a worker may run it while the caller is still mutating, so
/// [`default_scheduler`] never picks it there.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| Error::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// The scheduler used when none is configured: tokio if the caller is inside
/// a current-thread runtime, otherwise the global [`TaskQueue`], drained by
/// [`flush`].
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    match TokioScheduler::current() {
        Ok(tokio) if tokio.handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            Arc::new(tokio)
        }
        Ok(_) => {
            tracing::debug!("multi-thread runtime, deferring frames to the global task queue");
            Arc::new(TaskQueue::global().clone())
        }
        Err(_) => {
            tracing::debug!("no tokio runtime, deferring frames to the global task queue");
            Arc::new(TaskQueue::global().clone())
        }
    }
}

/// Drain the global task queue.
pub fn flush() -> usize {
    TaskQueue::global().run_until_idle()
}
