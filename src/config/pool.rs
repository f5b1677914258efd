//! Resource pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Configuration for a [`ResourcePool`](crate::core::ResourcePool).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePoolConfig {
    /// Maximum number of unowned resources kept for reuse; a release that
    /// finds the idle list full disposes the resource instead.
    pub max_idle_size: usize,
    /// Maximum age in seconds, measured from the last hand-out, after which
    /// a resource is disposed rather than reused. Values of 0 or below
    /// disable the lifetime check.
    pub max_lifetime_secs: i64,
}

impl ResourcePoolConfig {
    /// Create a configuration from its two knobs.
    #[must_use]
    pub const fn new(max_idle_size: usize, max_lifetime_secs: i64) -> Self {
        Self {
            max_idle_size,
            max_lifetime_secs,
        }
    }

    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_idle_size == 0 {
            return Err(ConfigError::Invalid(
                "max_idle_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The lifetime as a duration, `None` when disabled.
    #[must_use]
    pub fn max_lifetime(&self) -> Option<Duration> {
        if self.max_lifetime_secs <= 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_lifetime_secs as u64))
        }
    }
}
