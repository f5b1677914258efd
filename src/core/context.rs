//! Execution context owning the in-flight task counter.

use parking_lot::Mutex;
use uuid::Uuid;

/// Shared bookkeeping for one [`TaskExecutor`](crate::core::TaskExecutor).
///
/// The context is created with its executor and lives as long as it does.
/// The counter is mutated only under the context's own lock, so reads are
/// linearizable with the increments and decrements around task execution.
pub struct ExecutionContext {
    id: Uuid,
    running: Mutex<usize>,
}

impl ExecutionContext {
    /// Create a context with a fresh identifier and a zero counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            running: Mutex::new(0),
        }
    }

    /// Opaque identifier assigned at construction.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Number of tasks currently submitted and not yet finished.
    #[must_use]
    pub fn running_count(&self) -> usize {
        *self.running.lock()
    }

    /// Record a task entering the executor.
    pub fn task_started(&self) {
        *self.running.lock() += 1;
    }

    /// Record a task leaving the executor.
    ///
    /// Clamps at zero instead of underflowing; a double decrement must not
    /// wedge the drain wait.
    pub fn task_finished(&self) {
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("running", &self.running_count())
            .finish()
    }
}
