//! Adapter configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [store]
//! on_disconnected = "fail_fast"
//! sweep_interval = "60s"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What adapter operations do when the store connection is not established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectedPolicy {
    /// Return [`crate::StoreError::NotConnected`].
    FailFast,
    /// Reads return "not found" and writes are dropped, with a warning.
    EmptyResult,
}

/// Adapter configuration passed into [`crate::AdapterFactory`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// Behaviour when the connection is missing. Deliberately has no default.
    pub on_disconnected: DisconnectedPolicy,

    /// How often elapsed records are physically purged.
    /// `0s` disables the sweeper.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

impl AdapterConfig {
    /// Create a configuration with the given disconnected policy.
    #[must_use]
    pub fn new(on_disconnected: DisconnectedPolicy) -> Self {
        Self {
            on_disconnected,
            sweep_interval: default_sweep_interval(),
        }
    }

    /// Sets the sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Returns `true` if the expiry sweeper should run.
    #[must_use]
    pub fn sweeper_enabled(&self) -> bool {
        !self.sweep_interval.is_zero()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a non-zero sweep interval is
    /// shorter than one second.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweeper_enabled() && self.sweep_interval < Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue(format!(
                "sweep_interval must be 0s or at least 1s, got {:?}",
                self.sweep_interval
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
