//! Configuration for the session cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the session cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Seconds a session may stay unused before it is reclaimed (default: 180).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the reaper scans for idle sessions in seconds (default: 60).
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Drop a session's handle when a call against it fails, so the next
    /// call resolves the backend again (default: false).
    #[serde(default)]
    pub evict_on_error: bool,
}

fn default_idle_timeout_secs() -> u64 {
    180 // 3 minutes
}

fn default_reap_interval_secs() -> u64 {
    60
}

/// Largest accepted idle timeout in seconds (one week).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Largest accepted reap interval in seconds (one day).
pub const MAX_REAP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheConfigError {
    /// Invalid idle timeout (must be > 0).
    #[error("Invalid idle timeout: must be greater than 0")]
    InvalidIdleTimeout,

    /// Invalid reap interval (must be > 0).
    #[error("Invalid reap interval: must be greater than 0")]
    InvalidReapInterval,

    /// A duration setting exceeds its upper bound.
    #[error("Invalid {field}: {value} exceeds the maximum of {max} seconds")]
    TooLarge {
        /// Name of the offending setting.
        field: &'static str,
        /// Configured value.
        value: u64,
        /// Upper bound.
        max: u64,
    },
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            evict_on_error: false,
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(CacheConfigError::InvalidIdleTimeout);
        }

        if self.reap_interval_secs == 0 {
            return Err(CacheConfigError::InvalidReapInterval);
        }

        if self.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
            return Err(CacheConfigError::TooLarge {
                field: "idle_timeout_secs",
                value: self.idle_timeout_secs,
                max: MAX_IDLE_TIMEOUT_SECS,
            });
        }

        if self.reap_interval_secs > MAX_REAP_INTERVAL_SECS {
            return Err(CacheConfigError::TooLarge {
                field: "reap_interval_secs",
                value: self.reap_interval_secs,
                max: MAX_REAP_INTERVAL_SECS,
            });
        }

        Ok(())
    }

    /// Get the idle timeout as a Duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get the reap interval as a Duration.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}
