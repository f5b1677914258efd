//! Worker pool engine behind the task executor.
//!
//! The executor decides a [`PoolShape`] from its configuration once, then
//! builds one of three pools over the same engine: a single dedicated worker,
//! a fixed-size pool, or an elastic pool that grows from core to max when the
//! queue fills and retires idle workers after the keep-alive. The narrower
//! shapes exist because a single worker and a fixed pool have cheaper, more
//! predictable semantics than a growable pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::executor::BoxedTask;

/// Work queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueSpec {
    /// Queue holds at most this many pending tasks.
    Bounded(usize),
    /// Queue never rejects a pending task.
    Unbounded,
}

/// Pool shape selected from executor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PoolShape {
    /// One dedicated worker thread; tasks strictly serialized.
    SingleWorker {
        /// Work queue sizing.
        queue: QueueSpec,
    },
    /// A fixed number of worker threads, all started up front.
    FixedPool {
        /// Worker thread count.
        size: usize,
        /// Work queue sizing.
        queue: QueueSpec,
    },
    /// Grows from `core` toward `max` when the queue fills; idle workers
    /// above core (or any worker, when core timeout is allowed) retire
    /// after `keep_alive`.
    ElasticPool {
        /// Threads kept alive without regard to the keep-alive, unless
        /// `allow_core_timeout` is set.
        core: usize,
        /// Upper bound on threads; `None` means unbounded.
        max: Option<usize>,
        /// Idle time after which an eligible worker retires.
        keep_alive: Duration,
        /// Let core workers retire on idle timeout as well.
        allow_core_timeout: bool,
        /// Spawn all core workers at construction instead of on demand.
        prestart: bool,
        /// Work queue sizing.
        queue: QueueSpec,
    },
}

pub(crate) struct WorkerPool {
    inner: Arc<Inner>,
    /// Task sender. `None` after shutdown; dropping it unblocks idle workers.
    tx: Mutex<Option<Sender<BoxedTask>>>,
}

struct Inner {
    core: usize,
    /// `usize::MAX` when unbounded.
    max: usize,
    /// `None` means workers never retire on idle.
    keep_alive: Option<Duration>,
    allow_core_timeout: bool,
    /// Elastic pools top up core workers per submission; retired core
    /// workers reappear as work arrives.
    elastic: bool,
    name_prefix: String,
    worker_count: AtomicUsize,
    next_worker_id: AtomicUsize,
    /// Kept here so new workers can be spawned with a receive handle.
    rx: Receiver<BoxedTask>,
}

impl WorkerPool {
    /// Build the pool for the given shape, spawning any up-front workers.
    pub(crate) fn build(shape: &PoolShape, name_prefix: &str) -> Self {
        let (queue, core, max, keep_alive, allow_core_timeout, prestart) = match *shape {
            PoolShape::SingleWorker { queue } => (queue, 1, 1, None, false, true),
            PoolShape::FixedPool { size, queue } => (queue, size, size, None, false, true),
            PoolShape::ElasticPool {
                core,
                max,
                keep_alive,
                allow_core_timeout,
                prestart,
                queue,
            } => (
                queue,
                core,
                max.unwrap_or(usize::MAX),
                Some(keep_alive),
                allow_core_timeout,
                prestart,
            ),
        };

        let (tx, rx) = match queue {
            QueueSpec::Bounded(capacity) => bounded::<BoxedTask>(capacity),
            QueueSpec::Unbounded => unbounded::<BoxedTask>(),
        };

        let inner = Arc::new(Inner {
            core,
            max,
            keep_alive,
            allow_core_timeout,
            elastic: keep_alive.is_some(),
            name_prefix: name_prefix.to_owned(),
            worker_count: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(1),
            rx,
        });

        if prestart {
            for _ in 0..core {
                inner.worker_count.fetch_add(1, Ordering::AcqRel);
                spawn_worker(&inner, None);
            }
        }

        info!(
            core = core,
            max = if max == usize::MAX { -1 } else { max as i64 },
            prestart = prestart,
            "worker pool initialized"
        );

        Self {
            inner,
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Hand a task to a worker.
    ///
    /// Elastic pools grow toward max when the queue is full, handing the
    /// rejected task to the new worker directly; at max size the call blocks
    /// until a queue slot frees up. A task dispatched after shutdown is
    /// dropped with a warning.
    pub(crate) fn dispatch(&self, task: BoxedTask) {
        let tx = {
            let guard = self.tx.lock();
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    warn!("worker pool is shut down, dropping task");
                    return;
                }
            }
        };

        match tx.try_send(task) {
            Ok(()) => {
                if self.inner.elastic {
                    self.inner.ensure_core_worker();
                }
            }
            Err(TrySendError::Full(task)) => {
                if let Some(task) = self.inner.try_spawn_extra(task) {
                    debug!("pool at max size, blocking on full queue");
                    if tx.send(task).is_err() {
                        warn!("worker pool disconnected, dropping task");
                    }
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("worker pool disconnected, dropping task");
            }
        }
    }

    /// Drop the task sender. Workers drain the queue, then exit.
    pub(crate) fn shutdown(&self) {
        let mut tx = self.tx.lock();
        if tx.take().is_some() {
            info!("worker pool shutting down");
        }
    }

    /// Current number of worker threads.
    pub(crate) fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers are detached; dropping the sender lets them exit once the
        // queue is drained.
        self.shutdown();
    }
}

impl Inner {
    /// Top up core workers after an enqueue (elastic pools only).
    fn ensure_core_worker(self: &Arc<Self>) {
        let mut count = self.worker_count.load(Ordering::Acquire);
        loop {
            if count >= self.core {
                return;
            }
            match self.worker_count.compare_exchange(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    spawn_worker(self, None);
                    return;
                }
                Err(actual) => count = actual,
            }
        }
    }

    /// Grow beyond core for a task the queue rejected. Returns the task when
    /// the pool is already at max size.
    fn try_spawn_extra(self: &Arc<Self>, task: BoxedTask) -> Option<BoxedTask> {
        let mut count = self.worker_count.load(Ordering::Acquire);
        loop {
            if count >= self.max {
                return Some(task);
            }
            match self.worker_count.compare_exchange(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    spawn_worker(self, Some(task));
                    return None;
                }
                Err(actual) => count = actual,
            }
        }
    }

    /// Next task for a worker, or `None` when the worker should exit.
    fn next_job(&self) -> Option<BoxedTask> {
        let mut timed_out = false;
        loop {
            if timed_out && self.try_retire() {
                return None;
            }

            let timeout = self.keep_alive.filter(|_| self.may_time_out());
            let received = match timeout {
                Some(keep_alive) => self.rx.recv_timeout(keep_alive),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(task) => return Some(task),
                Err(RecvTimeoutError::Timeout) => timed_out = true,
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_count.fetch_sub(1, Ordering::AcqRel);
                    return None;
                }
            }
        }
    }

    fn may_time_out(&self) -> bool {
        self.allow_core_timeout || self.worker_count.load(Ordering::Acquire) > self.core
    }

    /// Retire an idle worker, keeping the pool above core size unless core
    /// timeout is allowed, and never abandoning a non-empty queue as the last
    /// worker.
    fn try_retire(&self) -> bool {
        let mut count = self.worker_count.load(Ordering::Acquire);
        loop {
            if !(self.allow_core_timeout || count > self.core) {
                return false;
            }
            if count == 1 && !self.rx.is_empty() {
                return false;
            }
            match self.worker_count.compare_exchange(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }
}

/// Spawn a named worker thread, optionally seeded with a first task.
fn spawn_worker(inner: &Arc<Inner>, initial: Option<BoxedTask>) {
    let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}{id}", inner.name_prefix);
    let inner = Arc::clone(inner);

    thread::Builder::new()
        .name(name)
        .spawn(move || worker_loop(&inner, initial))
        .expect("failed to spawn worker thread");
}

fn worker_loop(inner: &Inner, initial: Option<BoxedTask>) {
    debug!("worker thread started");

    let mut next = initial;
    loop {
        let task = match next.take() {
            Some(task) => task,
            None => match inner.next_job() {
                Some(task) => task,
                None => break,
            },
        };

        // Keep the worker alive across task panics; the executor's drop
        // guard still balances the in-flight counter.
        if panic::catch_unwind(AssertUnwindSafe(move || task())).is_err() {
            warn!("submitted task panicked");
        }
    }

    debug!("worker thread exiting");
}
