//! Background task execution.
//!
//! Work that may block on receiver I/O is never run on the thread that
//! delivered the triggering report. It is handed to a [`TaskRunner`]
//! instead, fire-and-forget: the submitter does not wait for the result
//! and tasks carry no ordering guarantee relative to each other.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks independently of the submitting thread.
pub trait TaskRunner: Send + Sync {
    /// Submit a task. Must not run it inline.
    fn spawn(&self, task: Task);
}

/// Runs tasks on the blocking pool of a tokio runtime.
///
/// Tasks are tracked so callers can wait for everything submitted so far
/// with [`TokioRunner::idle`].
///
/// # Example
///
/// ```
/// use rxmon_core::task::{TaskRunner, TokioRunner};
///
/// #[tokio::main]
/// async fn main() {
///     let runner = TokioRunner::current().unwrap();
///     runner.spawn(Box::new(|| println!("in the background")));
///     runner.idle().await;
/// }
/// ```
#[derive(Clone)]
pub struct TokioRunner {
    handle: Handle,
    tracker: TaskTracker,
    // Serializes close/wait/reopen across concurrent `idle` callers.
    idle: Arc<Mutex<()>>,
}

impl TokioRunner {
    /// Create a runner on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
            idle: Arc::new(Mutex::new(())),
        }
    }

    /// Create a runner on the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            Error::InvalidConfig(format!("no tokio runtime available: {}", e))
        })?;
        Ok(Self::new(handle))
    }

    /// Number of submitted tasks that have not finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task submitted so far has finished.
    ///
    /// Concurrent callers take turns; each returns once the tracker has
    /// drained after its own turn began.
    pub async fn idle(&self) {
        let _turn = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl TaskRunner for TokioRunner {
    fn spawn(&self, task: Task) {
        // The join handle is dropped: tasks are detached.
        let _ = self.tracker.spawn_blocking_on(task, &self.handle);
    }
}

impl fmt::Debug for TokioRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioRunner")
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}
