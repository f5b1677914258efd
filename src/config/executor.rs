//! Executor configuration and pool-shape selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::worker_pool::{PoolShape, QueueSpec};

/// Keep-alive fallback in seconds when a negative value is configured.
const DEFAULT_KEEP_ALIVE_SECS: i64 = 60;

/// Configuration for a [`TaskExecutor`](crate::core::TaskExecutor).
///
/// Out-of-range values are clamped rather than rejected, because these knobs
/// routinely arrive from external property files where `-1` conventionally
/// means "unlimited": a core size below 1 becomes 1, a negative max size or
/// queue capacity means unbounded, and a negative keep-alive falls back to
/// 60 seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker threads kept alive regardless of idle time (unless
    /// `allow_core_thread_timeout` is set). Clamped to at least 1.
    pub core_pool_size: i32,
    /// Upper bound on worker threads; negative means unbounded.
    pub max_pool_size: i32,
    /// Idle seconds after which an eligible worker retires; negative falls
    /// back to 60.
    pub keep_alive_secs: i64,
    /// Pending-task queue capacity; negative means unbounded.
    pub queue_capacity: i64,
    /// Let core workers retire on idle timeout as well.
    pub allow_core_thread_timeout: bool,
    /// Spawn all core workers when the pool is built instead of on demand.
    pub prestart_core_threads: bool,
    /// Prefix for worker thread names; a per-pool counter is appended.
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let cpus = num_cpus::get() as i32;
        Self {
            core_pool_size: cpus,
            max_pool_size: cpus,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            queue_capacity: -1,
            allow_core_thread_timeout: false,
            prestart_core_threads: false,
            thread_name_prefix: "workpool-".to_owned(),
        }
    }
}

impl ExecutorConfig {
    /// A configuration sized to the machine: fixed pool of one worker per
    /// CPU over an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the core pool size.
    #[must_use]
    pub const fn with_core_pool_size(mut self, val: i32) -> Self {
        self.core_pool_size = val;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub const fn with_max_pool_size(mut self, val: i32) -> Self {
        self.max_pool_size = val;
        self
    }

    /// Set the idle keep-alive in seconds.
    #[must_use]
    pub const fn with_keep_alive_secs(mut self, val: i64) -> Self {
        self.keep_alive_secs = val;
        self
    }

    /// Set the pending-task queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, val: i64) -> Self {
        self.queue_capacity = val;
        self
    }

    /// Allow core workers to retire on idle timeout.
    #[must_use]
    pub const fn with_allow_core_thread_timeout(mut self, val: bool) -> Self {
        self.allow_core_thread_timeout = val;
        self
    }

    /// Spawn all core workers at pool construction.
    #[must_use]
    pub const fn with_prestart_core_threads(mut self, val: bool) -> Self {
        self.prestart_core_threads = val;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, val: impl Into<String>) -> Self {
        self.thread_name_prefix = val.into();
        self
    }

    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration values that clamping cannot repair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    /// Decide the pool shape from the clamped sizing values.
    ///
    /// A max size of 1 always selects the single dedicated worker; equal
    /// core and max sizes select the fixed pool; anything else selects the
    /// elastic pool.
    pub(crate) fn shape(&self) -> PoolShape {
        let queue = if self.queue_capacity < 0 {
            QueueSpec::Unbounded
        } else {
            QueueSpec::Bounded(self.queue_capacity as usize)
        };

        if self.max_pool_size == 1 {
            return PoolShape::SingleWorker { queue };
        }

        let core = self.core_pool_size.max(1) as usize;
        // Max is the hard bound; a core size above it is lowered to match.
        let (core, max) = if self.max_pool_size < 0 {
            (core, None)
        } else {
            let max = (self.max_pool_size as usize).max(1);
            (core.min(max), Some(max))
        };
        let keep_alive = if self.keep_alive_secs < 0 {
            Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS as u64)
        } else {
            Duration::from_secs(self.keep_alive_secs as u64)
        };

        match max {
            Some(max_size) if max_size == core => PoolShape::FixedPool {
                size: max_size,
                queue,
            },
            _ => PoolShape::ElasticPool {
                core,
                max,
                keep_alive,
                allow_core_timeout: self.allow_core_thread_timeout,
                prestart: self.prestart_core_threads,
                queue,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_of_one_selects_single_worker() {
        let shape = ExecutorConfig::new()
            .with_core_pool_size(5)
            .with_max_pool_size(1)
            .shape();
        assert!(matches!(shape, PoolShape::SingleWorker { .. }));
    }

    #[test]
    fn test_equal_core_and_max_selects_fixed_pool() {
        let shape = ExecutorConfig::new()
            .with_core_pool_size(4)
            .with_max_pool_size(4)
            .shape();
        assert!(matches!(shape, PoolShape::FixedPool { size: 4, .. }));
    }

    #[test]
    fn test_growable_sizes_select_elastic_pool() {
        let shape = ExecutorConfig::new()
            .with_core_pool_size(2)
            .with_max_pool_size(8)
            .with_keep_alive_secs(30)
            .shape();
        match shape {
            PoolShape::ElasticPool {
                core,
                max,
                keep_alive,
                ..
            } => {
                assert_eq!(core, 2);
                assert_eq!(max, Some(8));
                assert_eq!(keep_alive, Duration::from_secs(30));
            }
            other => panic!("expected elastic pool, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let shape = ExecutorConfig::new()
            .with_core_pool_size(0)
            .with_max_pool_size(-1)
            .with_keep_alive_secs(-5)
            .with_queue_capacity(-1)
            .shape();
        match shape {
            PoolShape::ElasticPool {
                core,
                max,
                keep_alive,
                queue,
                ..
            } => {
                assert_eq!(core, 1);
                assert_eq!(max, None);
                assert_eq!(keep_alive, Duration::from_secs(60));
                assert_eq!(queue, QueueSpec::Unbounded);
            }
            other => panic!("expected elastic pool, got {other:?}"),
        }
    }

    #[test]
    fn test_from_json_str() {
        let cfg = ExecutorConfig::from_json_str(
            r#"{
                "core_pool_size": 2,
                "max_pool_size": 6,
                "keep_alive_secs": 15,
                "queue_capacity": 100,
                "allow_core_thread_timeout": true,
                "prestart_core_threads": false,
                "thread_name_prefix": "svc-"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.core_pool_size, 2);
        assert_eq!(cfg.thread_name_prefix(), "svc-");

        let err = ExecutorConfig::from_json_str(
            r#"{
                "core_pool_size": 2,
                "max_pool_size": 6,
                "keep_alive_secs": 15,
                "queue_capacity": 100,
                "allow_core_thread_timeout": true,
                "prestart_core_threads": false,
                "thread_name_prefix": ""
            }"#,
        );
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
