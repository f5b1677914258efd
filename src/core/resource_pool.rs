//! Thread-affine pool of reusable resources.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ResourcePoolConfig;

/// Policy hooks the pool requires from its embedder.
///
/// The pool calls these while holding its lock, so they should be quick;
/// `create` is the exception and may be slow — concurrent cold-start
/// allocations are serialized on purpose.
pub trait ResourceManager: Send + Sync {
    /// The pooled payload type.
    type Resource: Send + Sync;

    /// Construct a fresh resource. A panic here propagates to the
    /// [`ResourcePool::allocate`] caller; the pool cannot self-heal from a
    /// broken factory.
    fn create(&self) -> Self::Resource;

    /// Whether the resource is still usable. A wrong `true` only risks
    /// handing out a bad resource; it never corrupts pool bookkeeping.
    fn is_valid(&self, resource: &Self::Resource) -> bool;

    /// Release the underlying resource. Best-effort: an `Err` is logged by
    /// the pool and never propagated.
    fn dispose(&self, resource: &Self::Resource) -> anyhow::Result<()>;
}

/// A resource known to the pool, stamped with its last hand-out time.
struct PooledResource<T> {
    resource: Arc<T>,
    allocated_at: Instant,
}

/// Idle list and in-use map, guarded together by one lock.
struct PoolState<T> {
    /// FIFO of unowned resources, bounded by `max_idle_size`.
    idle: VecDeque<PooledResource<T>>,
    /// One entry per thread currently holding a resource.
    in_use: HashMap<ThreadId, PooledResource<T>>,
}

/// Generic thread-affine resource pool.
///
/// `allocate` prefers the resource the calling thread already holds, then
/// the idle-list head, then a fresh one from the manager. Validity and
/// lifetime are checked at every hand-out and return — never by a background
/// sweeper, so a stale resource that is never touched again stays allocated
/// until [`ResourcePool::destroy`]. All three operations are mutually
/// exclusive via one pool-wide lock; a resource's *use* between allocate and
/// release happens entirely outside it.
pub struct ResourcePool<M: ResourceManager> {
    manager: M,
    max_idle_size: usize,
    /// `None` disables the lifetime check.
    max_lifetime: Option<Duration>,
    state: Mutex<PoolState<M::Resource>>,
}

impl<M: ResourceManager> ResourcePool<M> {
    /// Create an empty pool with the given configuration and policy hooks.
    pub fn new(config: ResourcePoolConfig, manager: M) -> Self {
        Self {
            manager,
            max_idle_size: config.max_idle_size,
            max_lifetime: config.max_lifetime(),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                in_use: HashMap::new(),
            }),
        }
    }

    /// Hand the calling thread a valid resource.
    ///
    /// Preference order: the thread's own unreleased resource, the idle-list
    /// head, a newly created one. A candidate past its lifetime or failing
    /// validation is disposed and replaced transparently; the caller only
    /// ever observes a usable resource.
    pub fn allocate(&self) -> Arc<M::Resource> {
        let thread_id = thread::current().id();
        let mut state = self.state.lock();

        let mut from_idle = false;
        let candidate = state.in_use.remove(&thread_id).or_else(|| {
            from_idle = true;
            state.idle.pop_front()
        });

        let entry = match candidate {
            Some(mut entry) if self.is_usable(&entry) => {
                if from_idle {
                    entry.allocated_at = Instant::now();
                }
                debug!(from_idle = from_idle, "reusing pooled resource");
                entry
            }
            other => {
                if let Some(stale) = other {
                    self.dispose_quietly(&stale);
                }
                debug!("creating pooled resource");
                PooledResource {
                    resource: Arc::new(self.manager.create()),
                    allocated_at: Instant::now(),
                }
            }
        };

        let payload = Arc::clone(&entry.resource);
        state.in_use.insert(thread_id, entry);
        payload
    }

    /// Return a resource to the pool.
    ///
    /// Acts only when `resource` is the calling thread's current lease;
    /// releasing a resource never obtained through this pool, or one already
    /// released, is a silent no-op. A returned resource is re-queued at the
    /// idle tail unless the idle list is full, the resource outlived its
    /// lifetime, or it fails validation — in which case it is disposed.
    pub fn release(&self, resource: &Arc<M::Resource>) {
        let thread_id = thread::current().id();
        let mut state = self.state.lock();

        let matches = state
            .in_use
            .get(&thread_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.resource, resource));
        if !matches {
            return;
        }
        let entry = match state.in_use.remove(&thread_id) {
            Some(entry) => entry,
            None => return,
        };

        if state.idle.len() >= self.max_idle_size || !self.is_usable(&entry) {
            self.dispose_quietly(&entry);
        } else {
            state.idle.push_back(entry);
        }
    }

    /// Dispose every resource the pool knows about, idle and in-use alike.
    ///
    /// Each disposal is independently guarded so one failure never skips the
    /// rest; both structures are cleared unconditionally.
    pub fn destroy(&self) {
        let mut state = self.state.lock();

        let idle = state.idle.len();
        let in_use = state.in_use.len();
        for entry in state.idle.drain(..) {
            self.dispose_quietly(&entry);
        }
        for (_, entry) in state.in_use.drain() {
            self.dispose_quietly(&entry);
        }
        debug!(idle = idle, in_use = in_use, "resource pool destroyed");
    }

    /// Number of resources currently waiting in the idle list.
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Number of resources currently leased out.
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Within lifetime and still valid per the manager.
    fn is_usable(&self, entry: &PooledResource<M::Resource>) -> bool {
        let expired = self
            .max_lifetime
            .is_some_and(|lifetime| entry.allocated_at.elapsed() > lifetime);
        !expired && self.manager.is_valid(&entry.resource)
    }

    /// Dispose, logging instead of propagating failures. Propagating here
    /// would mask the allocate/release outcome that triggered the disposal.
    fn dispose_quietly(&self, entry: &PooledResource<M::Resource>) {
        if let Err(error) = self.manager.dispose(&entry.resource) {
            warn!(error = %error, "failed to dispose pooled resource");
        }
    }
}

impl<M: ResourceManager> Drop for ResourcePool<M> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<M: ResourceManager> std::fmt::Debug for ResourcePool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourcePool")
            .field("idle", &state.idle.len())
            .field("in_use", &state.in_use.len())
            .field("max_idle_size", &self.max_idle_size)
            .field("max_lifetime", &self.max_lifetime)
            .finish()
    }
}
