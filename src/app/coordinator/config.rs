//! Configuration structures for the download coordinator
//!
//! This module defines where downloads go, how the worker pool is sized and
//! whether a termination signal stops the session early.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::worker::WorkerConfig;
use crate::constants::paths;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for the download coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Root directory; each catalog downloads into `<root>/<catalog>`
    pub downloads_dir: PathBuf,
    /// Stop handing out new tasks on Ctrl+C / SIGTERM
    pub stop_on_signal: bool,
    /// Worker configuration
    pub worker_config: WorkerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from(paths::DOWNLOADS_DIR),
            stop_on_signal: true,
            worker_config: WorkerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Set the downloads root
    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    /// Set the number of workers
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_config.worker_count = count;
        self
    }

    /// Replace the worker configuration
    pub fn with_worker_config(mut self, worker_config: WorkerConfig) -> Self {
        self.worker_config = worker_config;
        self
    }

    /// Enable or disable signal handling
    pub fn with_stop_on_signal(mut self, enabled: bool) -> Self {
        self.stop_on_signal = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DownloadResult<()> {
        if self.downloads_dir.as_os_str().is_empty() {
            return Err(DownloadError::ConfigurationError(
                "Downloads directory cannot be empty".to_string(),
            ));
        }
        self.worker_config.validate()
    }
}
