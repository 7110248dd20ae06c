//! Download worker system
//!
//! A fixed-size pool of workers drains the shared [`TaskQueue`](crate::app::queue::TaskQueue).
//! Each worker validates, fetches, transcodes and tags one task at a time and
//! emits exactly one [`TaskOutcome`] per task it claims.
//!
//! # Key Features
//!
//! - **Idempotent**: an existing file whose duration matches is skipped
//! - **Shared identity rotation**: rate-limited workers go through one
//!   single-flight [`IdentityGuard`](crate::app::identity::IdentityGuard)
//! - **Contained failures**: a failing task never stops the pool
//! - **Backpressure**: outcomes travel over a bounded channel; a full channel
//!   makes the worker wait instead of losing the event
//!
//! # Module Organization
//!
//! - [`config`] - Worker configuration with validation and builder
//! - [`types`] - Task outcomes and worker counters
//! - [`backoff`] - Retry delay calculation
//! - [`core`] - Individual worker implementation
//! - [`pool`] - Worker pool lifecycle
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playlist_fetcher::app::identity::IdentityGuard;
//! use playlist_fetcher::app::provider::MediaTools;
//! use playlist_fetcher::app::queue::TaskQueue;
//! use playlist_fetcher::app::worker::{WorkerConfig, WorkerPool};
//!
//! # async fn example(queue: TaskQueue, tools: MediaTools) -> Result<(), Box<dyn std::error::Error>> {
//! let mut pool = WorkerPool::new(
//!     WorkerConfig::default(),
//!     queue,
//!     tools,
//!     Arc::new(IdentityGuard::disabled()),
//! );
//!
//! let (outcome_tx, mut outcome_rx) = tokio::sync::mpsc::channel(64);
//! pool.start(outcome_tx).await?;
//!
//! let monitor = tokio::spawn(async move {
//!     while let Some(outcome) = outcome_rx.recv().await {
//!         println!("Worker {}: {}", outcome.worker_id, outcome.summary());
//!     }
//! });
//!
//! let summary = pool.join().await;
//! monitor.await?;
//! println!("{} tasks processed", summary.stats.tasks_processed);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod core;
pub mod pool;
pub mod types;

pub use backoff::BackoffCalculator;
pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use core::{DownloadWorker, DownloadWorkerBuilder};
pub use pool::{PoolState, PoolSummary, WorkerPool};
pub use types::{OutcomeStatus, TaskOutcome, WorkerResult, WorkerStats};
