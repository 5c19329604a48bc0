//! Worker pool configuration.
//!
//! [`PoolConfig`] can be built in code, deserialized from JSON, or read from
//! the environment:
//!
//! | Variable          | Field     | Default                     |
//! |-------------------|-----------|-----------------------------|
//! | `TASKQ_POOL_NAME` | `name`    | `"default"`                 |
//! | `TASKQ_WORKERS`   | `workers` | available parallelism (≥ 1) |

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the pool name.
pub const POOL_NAME_VAR: &str = "TASKQ_POOL_NAME";

/// Environment variable holding the worker count.
pub const WORKERS_VAR: &str = "TASKQ_WORKERS";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Settings for a [`WorkerPool`](crate::pool::WorkerPool).
///
/// Missing JSON fields fall back to [`PoolConfig::default`].
///
/// # Examples
///
/// ```
/// use taskq::config::PoolConfig;
///
/// let config = PoolConfig::from_json(r#"{ "name": "mailer", "workers": 2 }"#).unwrap();
/// assert_eq!(config.name, "mailer");
/// assert_eq!(config.workers, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Name used in log records.
    pub name: String,
    /// Number of consumer tasks.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl PoolConfig {
    /// Creates a config with the given name and worker count.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
        }
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads [`POOL_NAME_VAR`] and [`WORKERS_VAR`] from the process environment
    /// over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(name) = lookup(POOL_NAME_VAR) {
            config.name = name;
        }
        if let Some(value) = lookup(WORKERS_VAR) {
            config.workers = value.trim().parse().map_err(|_| ConfigError::Env {
                var: WORKERS_VAR,
                value,
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be blank"));
        }
        Ok(())
    }
}
