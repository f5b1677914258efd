//! # Workpool
//!
//! In-flight-tracked task execution and thread-affine resource pooling.
//!
//! This library provides the two load-bearing pieces of an application
//! framework's execution layer:
//!
//! - [`core::TaskExecutor`] — a task-submission facade over a lazily built
//!   worker pool. Every submitted task is wrapped so a shared
//!   [`core::ExecutionContext`] counter goes up before the task body runs and
//!   comes back down after it finishes, no matter how it finishes. A blocking
//!   [`core::TaskExecutor::await_drain`] lets shutdown code wait for all
//!   in-flight work with a wall-clock deadline.
//! - [`core::ResourcePool`] — a generic pool of expensive reusable resources
//!   (client handles, connection managers). Each requesting thread is handed a
//!   valid resource, preferring the one that same thread last held, then the
//!   idle list, then a fresh one from the embedder's factory. Validity and
//!   lifetime are re-checked on every hand-out and return; pool shutdown
//!   disposes every known resource exactly once.
//!
//! ## Worker pool shaping
//!
//! The executor picks one of three pool shapes from its configuration, once,
//! on first submission:
//!
//! - `max_pool_size == 1` — a single dedicated worker, tasks strictly
//!   serialized;
//! - `core_pool_size == max_pool_size` — a fixed-size pool;
//! - otherwise — an elastic pool that grows from core to max when the queue
//!   fills, and retires idle workers after the keep-alive.
//!
//! ```rust
//! use workpool::config::ExecutorConfig;
//! use workpool::core::TaskExecutor;
//!
//! let executor = TaskExecutor::new(
//!     ExecutorConfig::new()
//!         .with_core_pool_size(4)
//!         .with_max_pool_size(4)
//!         .with_thread_name_prefix("app-worker-"),
//! );
//!
//! executor.submit(|| {
//!     // application work
//! });
//!
//! // Block until everything submitted has finished, up to 10 seconds.
//! let remaining = executor.await_drain(10_000, 250);
//! assert_eq!(remaining, 0);
//! ```
//!
//! ## Resource pooling
//!
//! ```rust
//! use workpool::config::ResourcePoolConfig;
//! use workpool::core::{ResourceManager, ResourcePool};
//!
//! struct ClientManager;
//!
//! impl ResourceManager for ClientManager {
//!     type Resource = String;
//!
//!     fn create(&self) -> String {
//!         "client-handle".to_owned()
//!     }
//!
//!     fn is_valid(&self, _resource: &String) -> bool {
//!         true
//!     }
//!
//!     fn dispose(&self, _resource: &String) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let pool = ResourcePool::new(ResourcePoolConfig::new(4, 300), ClientManager);
//! let client = pool.allocate();
//! // ... use the client outside the pool lock ...
//! pool.release(&client);
//! pool.destroy();
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Execution context, task executor, worker pool, and resource pool.
pub mod core;
/// Configuration models for the executor and the resource pool.
pub mod config;
/// Shared utilities.
pub mod util;
