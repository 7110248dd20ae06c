//! Worker configuration management
//!
//! Configuration structures and validation for download workers, with
//! defaults taken from [`crate::constants`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{limits, selector, workers};
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for download workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// Total attempts per task when failures are retried
    pub max_retries: u32,
    /// Wait after a rate-limited attempt before the next one
    pub rate_limit_backoff: Duration,
    /// Also retry failures that are not rate limits
    pub retry_transient: bool,
    /// Base delay between transient retries (exponential backoff)
    pub retry_base_delay: Duration,
    /// Maximum transient retry delay (backoff cap)
    pub retry_max_delay: Duration,
    /// Jitter percentage for backoff randomization
    pub backoff_jitter_percentage: f64,
    /// Largest accepted difference between probed and expected duration
    pub duration_tolerance_seconds: f64,
    /// Channel buffer size for task outcomes
    pub outcome_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_retries: limits::MAX_RETRIES,
            rate_limit_backoff: limits::RATE_LIMIT_BACKOFF,
            retry_transient: false,
            retry_base_delay: limits::RETRY_BASE_DELAY,
            retry_max_delay: limits::RETRY_MAX_DELAY,
            backoff_jitter_percentage: limits::BACKOFF_JITTER_FACTOR,
            duration_tolerance_seconds: selector::DURATION_TOLERANCE_SECS,
            outcome_buffer_size: workers::OUTCOME_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.worker_count == 0 {
            return Err(DownloadError::ConfigurationError(
                "Worker count cannot be zero".to_string(),
            ));
        }

        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(DownloadError::ConfigurationError(format!(
                "Worker count ({}) exceeds maximum ({})",
                self.worker_count,
                workers::MAX_WORKER_COUNT
            )));
        }

        if self.max_retries == 0 {
            return Err(DownloadError::ConfigurationError(
                "At least one attempt per task is required".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(DownloadError::ConfigurationError(
                "Retry base delay must not exceed max delay".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff_jitter_percentage) {
            return Err(DownloadError::ConfigurationError(
                "Backoff jitter percentage must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !self.duration_tolerance_seconds.is_finite() || self.duration_tolerance_seconds < 0.0 {
            return Err(DownloadError::ConfigurationError(
                "Duration tolerance must be a non-negative number of seconds".to_string(),
            ));
        }

        if self.outcome_buffer_size == 0 {
            return Err(DownloadError::ConfigurationError(
                "Outcome buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for WorkerConfig
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set total attempts per task
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the wait after a rate-limited attempt
    pub fn rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.config.rate_limit_backoff = backoff;
        self
    }

    /// Retry failures that are not rate limits
    pub fn retry_transient(mut self, enabled: bool) -> Self {
        self.config.retry_transient = enabled;
        self
    }

    /// Set transient retry delays
    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_base_delay = base;
        self.config.retry_max_delay = max;
        self
    }

    /// Set duration tolerance in seconds
    pub fn duration_tolerance_seconds(mut self, seconds: f64) -> Self {
        self.config.duration_tolerance_seconds = seconds;
        self
    }

    /// Set outcome buffer size
    pub fn outcome_buffer_size(mut self, size: usize) -> Self {
        self.config.outcome_buffer_size = size;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> DownloadResult<WorkerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
