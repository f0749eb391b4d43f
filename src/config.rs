//! Engine configuration
//!
//! All knobs are plain named options with documented defaults. Validation
//! runs once at startup; nothing re-validates at runtime.

use crate::error::{MonitorError, Result};
use std::time::Duration;

/// Configuration for the monitoring engine
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cadence of the anomaly sweep (default: 5 minutes)
    pub sweep_interval: Duration,

    /// Trailing evaluation window (default: 15 minutes)
    pub window: Duration,

    /// Action count within the window that flags a user (default: 100)
    pub threshold: u64,

    /// Cadence of the background generation loop (default: 30 seconds)
    pub generation_interval: Duration,

    /// Snapshot and `request_more` default page size (default: 25)
    pub default_page_size: usize,

    /// Upper clamp on `request_more` page size (default: 100)
    pub max_page_size: usize,

    /// Bound on a single audit store operation (default: 5 seconds)
    pub store_timeout: Duration,

    /// Per-observer push channel capacity (default: 64)
    pub delivery_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5 * 60),
            window: Duration::from_secs(15 * 60),
            threshold: 100,
            generation_interval: Duration::from_secs(30),
            default_page_size: 25,
            max_page_size: 100,
            store_timeout: Duration::from_secs(5),
            delivery_buffer: 64,
        }
    }
}

impl MonitorConfig {
    /// Set the sweep cadence
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the trailing evaluation window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the flagging threshold
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the generation loop cadence
    pub fn with_generation_interval(mut self, interval: Duration) -> Self {
        self.generation_interval = interval;
        self
    }

    /// Set the default page size
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Set the maximum page size
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Set the store operation timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the per-observer channel capacity
    pub fn with_delivery_buffer(mut self, capacity: usize) -> Self {
        self.delivery_buffer = capacity;
        self
    }

    /// Validate the configuration
    ///
    /// Called once at startup by components that consume this config.
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(MonitorError::Config(
                "threshold must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(MonitorError::Config(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(MonitorError::Config(
                "window must be non-zero".to_string(),
            ));
        }
        if self.generation_interval.is_zero() {
            return Err(MonitorError::Config(
                "generation_interval must be non-zero".to_string(),
            ));
        }
        if self.store_timeout.is_zero() {
            return Err(MonitorError::Config(
                "store_timeout must be non-zero".to_string(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(MonitorError::Config(
                "default_page_size must be at least 1".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(MonitorError::Config(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.delivery_buffer == 0 {
            return Err(MonitorError::Config(
                "delivery_buffer must be at least 1".to_string(),
            ));
        }
        if chrono::Duration::from_std(self.window).is_err() {
            return Err(MonitorError::Config(
                "window is too large to evaluate".to_string(),
            ));
        }
        Ok(())
    }
}
