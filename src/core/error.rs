//! Error types for executor and pool configuration.

use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration text could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Parsed configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
