//! Integration tests for ResourcePool
//!
//! These tests validate the pool's public contract:
//! - Thread-affinity reuse ahead of the idle list
//! - Idle-list capacity and FIFO behavior
//! - Lazy validity and lifetime eviction
//! - Exactly-once disposal across idle + in-use, including failing disposals
//! - Silent no-op release of unknown resources
//! - Conservation of resources under concurrent allocate/release

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use rand::Rng;
use workpool::config::ResourcePoolConfig;
use workpool::core::{ResourceManager, ResourcePool};

// ============================================================================
// TEST MANAGER
// ============================================================================

#[derive(Debug)]
struct TestResource {
    #[allow(dead_code)]
    serial: usize,
}

/// Counting manager with a validity switch and an optional failing dispose.
struct TestManager {
    created: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
    valid: Arc<AtomicBool>,
    fail_dispose: bool,
}

impl TestManager {
    fn new() -> Self {
        Self {
            created: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicUsize::new(0)),
            valid: Arc::new(AtomicBool::new(true)),
            fail_dispose: false,
        }
    }

    fn failing_dispose() -> Self {
        Self {
            fail_dispose: true,
            ..Self::new()
        }
    }

    fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        (
            Arc::clone(&self.created),
            Arc::clone(&self.disposed),
            Arc::clone(&self.valid),
        )
    }
}

impl ResourceManager for TestManager {
    type Resource = TestResource;

    fn create(&self) -> TestResource {
        TestResource {
            serial: self.created.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn is_valid(&self, _resource: &TestResource) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn dispose(&self, _resource: &TestResource) -> anyhow::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose {
            anyhow::bail!("backing client refused to close");
        }
        Ok(())
    }
}

fn pool_with(
    max_idle_size: usize,
    max_lifetime_secs: i64,
    manager: TestManager,
) -> ResourcePool<TestManager> {
    ResourcePool::new(
        ResourcePoolConfig::new(max_idle_size, max_lifetime_secs),
        manager,
    )
}

// ============================================================================
// THREAD-AFFINITY REUSE
// ============================================================================

#[test]
fn test_same_thread_reuse_is_reference_identical() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = pool_with(1, -1, manager);

    let first = pool.allocate();
    pool.release(&first);
    let second = pool.allocate();
    pool.release(&second);
    let third = pool.allocate();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unreleased_resource_is_preferred_over_idle() {
    let manager = TestManager::new();
    let (created, _, _) = manager.counters();
    let pool = pool_with(4, -1, manager);

    // A stale in-use entry, e.g. from a failed release path.
    let held = pool.allocate();
    assert_eq!(pool.in_use_count(), 1);

    // The same thread asks again without releasing: it gets its own
    // resource back, not a new one.
    let again = pool.allocate();
    assert!(Arc::ptr_eq(&held, &again));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.in_use_count(), 1);
}

#[test]
fn test_idle_resource_is_reused_across_threads_fifo() {
    let manager = TestManager::new();
    let (created, _, _) = manager.counters();
    let pool = Arc::new(pool_with(4, -1, manager));

    // Seed the idle list from a worker thread.
    {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let r = pool.allocate();
            pool.release(&r);
        })
        .join()
        .unwrap();
    }
    assert_eq!(pool.idle_count(), 1);

    // A different thread picks up the idle head instead of creating.
    let r = pool.allocate();
    drop(r);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(), 0);
}

// ============================================================================
// IDLE-LIST CAPACITY
// ============================================================================

#[test]
fn test_full_idle_list_triggers_exactly_one_disposal() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = Arc::new(pool_with(1, -1, manager));

    // Thread A allocates and parks until told to release.
    let (a_ready_tx, a_ready_rx) = mpsc::channel();
    let (a_go_tx, a_go_rx) = mpsc::channel();
    let handle = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let r = pool.allocate();
            a_ready_tx.send(()).unwrap();
            a_go_rx.recv().unwrap();
            pool.release(&r);
        })
    };

    a_ready_rx.recv().unwrap();
    // Thread B (this thread) must create a second resource.
    let b = pool.allocate();
    assert_eq!(created.load(Ordering::SeqCst), 2);

    // A releases first and fills the single idle slot.
    a_go_tx.send(()).unwrap();
    handle.join().unwrap();
    assert_eq!(pool.idle_count(), 1);

    // B's release finds the idle list full: exactly one disposal.
    pool.release(&b);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn test_idle_list_never_exceeds_capacity() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = Arc::new(pool_with(2, -1, manager));

    // Four threads allocate simultaneously, forcing four distinct
    // resources, then each releases its own.
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let r = pool.allocate();
                barrier.wait();
                pool.release(&r);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 4);
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.in_use_count(), 0);
}

// ============================================================================
// VALIDITY AND LIFETIME EVICTION
// ============================================================================

#[test]
fn test_invalidated_resource_is_disposed_on_release() {
    let manager = TestManager::new();
    let (_, disposed, valid) = manager.counters();
    let pool = pool_with(4, -1, manager);

    let r = pool.allocate();
    valid.store(false, Ordering::SeqCst);
    pool.release(&r);

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(), 0);

    // The next allocate sees no idle candidate and creates afresh.
    valid.store(true, Ordering::SeqCst);
    let replacement = pool.allocate();
    assert!(!Arc::ptr_eq(&r, &replacement));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalidated_affinity_entry_is_replaced_on_allocate() {
    let manager = TestManager::new();
    let (created, disposed, valid) = manager.counters();
    let pool = pool_with(4, -1, manager);

    let stale = pool.allocate();
    valid.store(false, Ordering::SeqCst);

    // Allocation re-checks the thread's own entry and replaces it.
    let fresh = pool.allocate();
    valid.store(true, Ordering::SeqCst);

    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_expired_idle_resource_is_replaced() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = pool_with(4, 1, manager);

    let first = pool.allocate();
    pool.release(&first);
    assert_eq!(pool.idle_count(), 1);

    thread::sleep(Duration::from_millis(1200));

    let second = pool.allocate();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(), 0);
}

// ============================================================================
// RELEASE EDGE CASES
// ============================================================================

#[test]
fn test_release_of_unknown_resource_is_a_no_op() {
    let manager = TestManager::new();
    let (_, disposed, _) = manager.counters();
    let pool = pool_with(4, -1, manager);

    let held = pool.allocate();
    let foreign = Arc::new(TestResource { serial: 999 });
    pool.release(&foreign);

    assert_eq!(pool.in_use_count(), 1, "lease must survive a foreign release");
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    pool.release(&held);
    assert_eq!(pool.in_use_count(), 0);
}

#[test]
fn test_double_release_is_a_no_op() {
    let manager = TestManager::new();
    let (_, disposed, _) = manager.counters();
    let pool = pool_with(4, -1, manager);

    let r = pool.allocate();
    pool.release(&r);
    pool.release(&r);

    assert_eq!(pool.idle_count(), 1);
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
}

// ============================================================================
// DESTROY
// ============================================================================

#[test]
fn test_destroy_disposes_idle_and_in_use_exactly_once() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = Arc::new(pool_with(4, -1, manager));

    // One idle entry seeded from a worker thread, one held by this thread.
    {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let r = pool.allocate();
            pool.release(&r);
        })
        .join()
        .unwrap();
    }
    let _held = pool.allocate();
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.in_use_count(), 1);

    pool.destroy();

    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.in_use_count(), 0);
}

#[test]
fn test_destroy_survives_failing_disposals() {
    let manager = TestManager::failing_dispose();
    let (_, disposed, _) = manager.counters();
    let pool = Arc::new(pool_with(4, -1, manager));

    {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let r = pool.allocate();
            pool.release(&r);
        })
        .join()
        .unwrap();
    }
    let _held = pool.allocate();

    pool.destroy();

    // Both disposals were attempted despite each returning an error.
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.in_use_count(), 0);
}

// ============================================================================
// CONCURRENT STRESS
// ============================================================================

#[test]
fn test_resources_are_conserved_under_concurrent_churn() {
    let manager = TestManager::new();
    let (created, disposed, _) = manager.counters();
    let pool = Arc::new(pool_with(4, -1, manager));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..200 {
                    let r = pool.allocate();
                    if rng.random_range(0..4) == 0 {
                        thread::sleep(Duration::from_micros(rng.random_range(0..50)));
                    }
                    pool.release(&r);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every created resource is accounted for: disposed or idle, none
    // leaked in the in-use map.
    assert_eq!(pool.in_use_count(), 0);
    assert!(pool.idle_count() <= 4);
    assert_eq!(
        created.load(Ordering::SeqCst),
        disposed.load(Ordering::SeqCst) + pool.idle_count()
    );
}
