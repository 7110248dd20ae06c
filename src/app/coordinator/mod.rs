//! Download orchestration and progress coordination
//!
//! The coordinator turns ledger rows into download tasks, runs the worker
//! pool over them and aggregates the outcomes into a [`SessionResult`].
//!
//! # Architecture
//!
//! - [`config`] - Configuration structures and validation
//! - [`progress`] - Progress aggregation and the observer seam used by displays
//! - [`signals`] - Stopping a session on Ctrl+C / SIGTERM
//! - [`stats`] - Session results
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playlist_fetcher::app::coordinator::{Coordinator, CoordinatorConfig};
//! use playlist_fetcher::app::identity::IdentityGuard;
//! use playlist_fetcher::app::ledger::Ledger;
//! use playlist_fetcher::app::provider::MediaTools;
//!
//! # async fn example(tools: MediaTools) -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::open("exports").await?;
//! let coordinator = Coordinator::new(
//!     CoordinatorConfig::default().with_worker_count(4),
//!     tools,
//!     Arc::new(IdentityGuard::disabled()),
//! );
//!
//! let result = coordinator.run_catalogs(&ledger, &["road-trip".to_string()]).await?;
//! println!("Downloaded {} tracks", result.downloaded);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod progress;
pub mod signals;
pub mod stats;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::identity::IdentityGuard;
use crate::app::ledger::Ledger;
use crate::app::models::DownloadTask;
use crate::app::provider::MediaTools;
use crate::app::queue::TaskQueue;
use crate::app::worker::WorkerPool;
use crate::errors::{QueueError, Result};

pub use config::CoordinatorConfig;
pub use progress::{NoopProgressObserver, ProgressAggregator, ProgressObserver, ProgressSnapshot};
pub use signals::{wait_for_termination, SignalHandler};
pub use stats::SessionResult;

/// Tasks derived from one or more ledgers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadPlan {
    /// Catalogs the tasks came from
    pub catalogs: Vec<String>,
    /// One task per ledger row with a link
    pub tasks: Vec<DownloadTask>,
    /// Rows recorded as `NOT FOUND`
    pub not_found_rows: usize,
    /// Ledgers that could not be read
    pub skipped_ledgers: Vec<String>,
}

/// Main coordinator for the download stage
pub struct Coordinator {
    config: CoordinatorConfig,
    tools: MediaTools,
    identity: Arc<IdentityGuard>,
    observer: Arc<dyn ProgressObserver>,
}

impl Coordinator {
    /// Create a coordinator with the given configuration and capabilities
    pub fn new(config: CoordinatorConfig, tools: MediaTools, identity: Arc<IdentityGuard>) -> Self {
        Self {
            config,
            tools,
            identity,
            observer: Arc::new(NoopProgressObserver),
        }
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build download tasks from the ledgers of `catalogs`
    ///
    /// A ledger that cannot be read is left out of the plan with a warning.
    pub async fn plan(&self, ledger: &Ledger, catalogs: &[String]) -> Result<DownloadPlan> {
        let mut plan = DownloadPlan::default();

        for catalog in catalogs {
            let records = match ledger.records(catalog).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Skipping ledger '{}': {}", catalog, e);
                    plan.skipped_ledgers.push(catalog.clone());
                    continue;
                }
            };
            plan.catalogs.push(catalog.clone());
            let before = plan.tasks.len();
            for record in &records {
                match DownloadTask::from_record(record, catalog, &self.config.downloads_dir) {
                    Some(task) => plan.tasks.push(task),
                    None => plan.not_found_rows += 1,
                }
            }
            info!(
                "Catalog '{}': {} ledger rows, {} downloadable",
                catalog,
                records.len(),
                plan.tasks.len() - before
            );
        }

        Ok(plan)
    }

    /// Download everything resolved in the ledgers of `catalogs`
    pub async fn run_catalogs(&self, ledger: &Ledger, catalogs: &[String]) -> Result<SessionResult> {
        let plan = self.plan(ledger, catalogs).await?;
        let not_found_rows = plan.not_found_rows;

        let mut result = self.run_tasks(plan.tasks).await?;
        result.catalogs = plan.catalogs;
        result.not_found_rows = not_found_rows;
        Ok(result)
    }

    /// Run the worker pool over `tasks` until the queue is drained
    ///
    /// Individual task failures are reported in the result, never as an
    /// error; only a configuration problem or a lost progress task is.
    pub async fn run_tasks(&self, tasks: Vec<DownloadTask>) -> Result<SessionResult> {
        let session_start = Instant::now();
        self.config.validate()?;

        let queue = TaskQueue::new();
        let total = queue.add_tasks(tasks).await;
        let start_generation = self.identity.generation();

        info!(
            "Starting download session: {} tasks, {} workers",
            total, self.config.worker_config.worker_count
        );

        let (outcome_tx, outcome_rx) = mpsc::channel(self.config.worker_config.outcome_buffer_size);
        let aggregator = ProgressAggregator::new(total, self.observer.clone()).start(outcome_rx);

        let signal = if self.config.stop_on_signal {
            let handler = SignalHandler::new(queue.clone());
            let triggered = handler.triggered();
            Some((handler.setup(), triggered))
        } else {
            None
        };

        let mut pool = WorkerPool::new(
            self.config.worker_config.clone(),
            queue.clone(),
            self.tools.clone(),
            self.identity.clone(),
        );
        // The pool hands clones to its workers; the channel closes when the
        // last worker returns.
        let started = pool.start(outcome_tx).await;

        let summary = pool.join().await;
        let snapshot = aggregator
            .await
            .map_err(|_| QueueError::ChannelClosed)?;

        let interrupted = match signal {
            Some((handle, triggered)) => {
                handle.abort();
                triggered.load(Ordering::SeqCst)
            }
            None => false,
        };
        started?;

        let mut result = SessionResult {
            total_tasks: total,
            dropped: queue.stats().await.discarded as usize,
            worker_failures: summary.worker_failures,
            rotations: self.identity.generation().saturating_sub(start_generation),
            interrupted,
            total_duration: session_start.elapsed(),
            ..Default::default()
        };
        result.apply_snapshot(&snapshot);

        if result.processed() + result.dropped < total {
            warn!(
                "{} tasks ended without an outcome",
                total - result.processed() - result.dropped
            );
        }

        info!(
            "Download session finished in {:?}: {} downloaded, {} skipped, {} failed",
            result.total_duration, result.downloaded, result.skipped, result.failed
        );
        Ok(result)
    }
}
