//! Configuration models for the executor and the resource pool.

pub mod executor;
pub mod pool;

pub use executor::ExecutorConfig;
pub use pool::ResourcePoolConfig;
