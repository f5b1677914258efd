//! Task-submission facade with in-flight tracking and polling drain.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ExecutorConfig;
use crate::core::context::ExecutionContext;
use crate::core::worker_pool::WorkerPool;

/// Fallback poll interval for [`TaskExecutor::await_drain`] when the caller
/// supplies a non-positive one.
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// A boxed unit of work, as handed between the executor and its workers.
pub type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Hook wrapping every submitted task before it crosses the thread hop.
///
/// The surrounding framework installs one of these to propagate tracing or
/// logging context onto the worker thread. The executor's in-flight bracket
/// always surrounds whatever the decorator returns, so a decorator cannot
/// unbalance the counter.
pub trait TaskDecorator: Send + Sync {
    /// Wrap `task`, returning the closure that will actually run on a worker.
    fn decorate(&self, task: BoxedTask) -> BoxedTask;
}

/// Decrements the context counter when dropped.
///
/// Moved into the submitted closure so the decrement runs after the task
/// body on success, on panic, and even when a task is discarded unrun.
struct RunningGuard {
    context: Arc<ExecutionContext>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.context.task_finished();
    }
}

/// Task-submission facade over a lazily built worker pool.
///
/// The pool shape (single worker, fixed, or elastic) is decided from the
/// configuration on first submission and cached for the executor's lifetime.
/// Every submitted task is bracketed so [`ExecutionContext::running_count`]
/// reflects work that has been submitted and not yet finished, which is what
/// [`TaskExecutor::await_drain`] polls at shutdown time.
pub struct TaskExecutor {
    config: ExecutorConfig,
    context: Arc<ExecutionContext>,
    decorator: Option<Arc<dyn TaskDecorator>>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl TaskExecutor {
    /// Create an executor; no worker threads are started until the first
    /// submission.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            context: Arc::new(ExecutionContext::new()),
            decorator: None,
            pool: Mutex::new(None),
        }
    }

    /// Install a decorator applied to every subsequently submitted task.
    #[must_use]
    pub fn with_decorator(mut self, decorator: impl TaskDecorator + 'static) -> Self {
        self.decorator = Some(Arc::new(decorator));
        self
    }

    /// The execution context shared with this executor's task wrappers.
    #[must_use]
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Submit a unit of work.
    ///
    /// The in-flight counter is incremented before the task is handed to the
    /// pool and decremented after the task body finishes, whatever the
    /// outcome. Panics from the task body are contained at the worker
    /// boundary and are not reinterpreted or retried here.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.pool();

        let guard = RunningGuard {
            context: Arc::clone(&self.context),
        };
        self.context.task_started();

        let task: BoxedTask = Box::new(task);
        let task = match &self.decorator {
            Some(decorator) => decorator.decorate(task),
            None => task,
        };

        pool.dispatch(Box::new(move || {
            let _guard = guard;
            task();
        }));
    }

    /// Number of tasks submitted and not yet finished.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.context.running_count()
    }

    /// Block until the in-flight count reaches zero or `max_wait_ms` elapses.
    ///
    /// The count is re-checked every `poll_interval_ms` (values below 1 fall
    /// back to 5000). A `max_wait_ms` below 1 waits forever. Returns the last
    /// observed count: 0 on a successful drain, non-zero on timeout; a
    /// timeout is reported through the return value, never as an error.
    ///
    /// This is a polling wait by design; draining is an infrequent
    /// shutdown-time operation, not a hot path.
    #[must_use = "a non-zero count means the drain timed out"]
    pub fn await_drain(&self, max_wait_ms: i64, poll_interval_ms: i64) -> usize {
        let interval = if poll_interval_ms < 1 {
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        } else {
            Duration::from_millis(poll_interval_ms as u64)
        };
        let deadline = if max_wait_ms < 1 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(max_wait_ms as u64))
        };

        loop {
            let count = self.running_count();
            if count == 0 {
                return 0;
            }

            let sleep = match deadline {
                None => interval,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!(remaining_tasks = count, "drain wait timed out");
                        return count;
                    }
                    interval.min(remaining)
                }
            };
            thread::sleep(sleep);
        }
    }

    /// Current number of worker threads, zero until the first submission
    /// builds the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool
            .lock()
            .as_ref()
            .map_or(0, |pool| pool.worker_count())
    }

    /// Stop accepting work and let workers exit once the queue is drained.
    ///
    /// Does not wait for in-flight tasks; call [`TaskExecutor::await_drain`]
    /// first for a graceful stop.
    pub fn shutdown(&self) {
        if let Some(pool) = self.pool.lock().as_ref() {
            pool.shutdown();
        }
    }

    /// The memoized worker pool, built from configuration on first use.
    fn pool(&self) -> Arc<WorkerPool> {
        let mut pool = self.pool.lock();
        match pool.as_ref() {
            Some(pool) => Arc::clone(pool),
            None => {
                let shape = self.config.shape();
                debug!(shape = ?shape, "building worker pool");
                let built = Arc::new(WorkerPool::build(
                    &shape,
                    self.config.thread_name_prefix(),
                ));
                *pool = Some(Arc::clone(&built));
                built
            }
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("context", &self.context)
            .finish()
    }
}
