//! Worker pool management and coordination
//!
//! This module provides a WorkerPool that spawns a fixed number of download
//! workers over one shared queue and waits for them to drain it. There is no
//! mid-task cancellation: once started, the pool finishes when the queue is
//! empty and every worker has returned.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::core::DownloadWorkerBuilder;
use super::types::{TaskOutcome, WorkerResult, WorkerStats};
use crate::app::identity::IdentityGuard;
use crate::app::provider::MediaTools;
use crate::app::queue::TaskQueue;
use crate::errors::{DownloadError, QueueError};

/// Pool for managing multiple download workers
#[derive(Debug)]
pub struct WorkerPool {
    /// Worker configuration
    config: WorkerConfig,
    /// Shared task queue
    queue: TaskQueue,
    /// Shared media capabilities
    tools: MediaTools,
    /// Shared identity guard
    identity: Arc<IdentityGuard>,
    /// Worker task handles, with the id of the worker they run
    worker_handles: Vec<(u32, JoinHandle<WorkerResult<WorkerStats>>)>,
    /// Pool state
    state: PoolState,
}

/// Current state of the worker pool
#[derive(Debug, Clone, PartialEq)]
pub enum PoolState {
    /// Pool has been created but not started
    Created,
    /// Pool is running with active workers
    Running,
    /// Waiting for workers to drain the queue
    Draining,
    /// All workers have returned
    Finished,
}

/// What the pool reports once every worker has returned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSummary {
    /// Workers that were spawned
    pub workers: usize,
    /// Counters merged across workers
    pub stats: WorkerStats,
    /// Workers that returned an error or panicked
    pub worker_failures: usize,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        config: WorkerConfig,
        queue: TaskQueue,
        tools: MediaTools,
        identity: Arc<IdentityGuard>,
    ) -> Self {
        Self {
            config,
            queue,
            tools,
            identity,
            worker_handles: Vec::new(),
            state: PoolState::Created,
        }
    }

    /// Current state
    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Start all workers
    ///
    /// Each worker gets a clone of `outcome_tx`; the channel closes once the
    /// last worker returns and the caller has dropped its own sender.
    pub async fn start(&mut self, outcome_tx: mpsc::Sender<TaskOutcome>) -> WorkerResult<()> {
        if self.state != PoolState::Created {
            return Err(DownloadError::ConfigurationError(format!(
                "Cannot start pool in state: {:?}",
                self.state
            )));
        }

        self.config.validate()?;
        info!(
            "Starting {} workers for {} queued tasks",
            self.config.worker_count,
            self.queue.pending_len().await
        );

        for worker_id in 0..self.config.worker_count as u32 {
            let worker = DownloadWorkerBuilder::new()
                .id(worker_id)
                .config(self.config.clone())
                .queue(self.queue.clone())
                .tools(self.tools.clone())
                .identity(self.identity.clone())
                .outcome_channel(outcome_tx.clone())
                .build()?;

            let handle = tokio::spawn(async move { worker.run().await });
            self.worker_handles.push((worker_id, handle));
        }

        self.state = PoolState::Running;
        debug!("Worker pool started with {} workers", self.config.worker_count);
        Ok(())
    }

    /// Wait for every worker to drain the queue and return
    pub async fn join(mut self) -> PoolSummary {
        if self.state != PoolState::Running {
            warn!("Joining pool in state: {:?}", self.state);
        }
        self.state = PoolState::Draining;

        let mut summary = PoolSummary {
            workers: self.worker_handles.len(),
            ..Default::default()
        };

        for (worker_id, handle) in self.worker_handles.drain(..) {
            match handle.await {
                Ok(Ok(stats)) => summary.stats.merge(&stats),
                Ok(Err(e)) => {
                    warn!("Worker {} failed: {}", worker_id, e);
                    summary.worker_failures += 1;
                }
                Err(e) => {
                    warn!("{}: {}", QueueError::WorkerPanic { worker_id }, e);
                    summary.worker_failures += 1;
                }
            }
        }

        if summary.worker_failures > 0 {
            warn!("{} workers terminated abnormally", summary.worker_failures);
        }

        self.state = PoolState::Finished;
        info!(
            "Worker pool finished: {} tasks processed by {} workers",
            summary.stats.tasks_processed, summary.workers
        );
        summary
    }
}
