//! Core download worker implementation
//!
//! A DownloadWorker repeatedly claims a task from the shared queue, checks
//! whether a valid file already exists, and otherwise fetches, transcodes
//! and tags the track. Every claimed task produces exactly one
//! [`TaskOutcome`]; the worker exits as soon as the queue is empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backoff::BackoffCalculator;
use super::config::WorkerConfig;
use super::types::{OutcomeStatus, TaskOutcome, WorkerResult, WorkerStats};
use crate::app::identity::IdentityGuard;
use crate::app::models::DownloadTask;
use crate::app::provider::{MediaTools, TrackTags};
use crate::app::queue::TaskQueue;
use crate::constants::paths;
use crate::errors::DownloadError;

/// Individual download worker
#[derive(Debug)]
pub struct DownloadWorker {
    /// Unique worker identifier
    id: u32,
    /// Worker configuration
    config: WorkerConfig,
    /// Shared task queue
    queue: TaskQueue,
    /// Fetch, transcode, tag and probe capabilities
    tools: MediaTools,
    /// Process-wide identity rotation
    identity: Arc<IdentityGuard>,
    /// Outcome reporting channel
    outcome_tx: mpsc::Sender<TaskOutcome>,
    /// Worker statistics
    stats: WorkerStats,
}

impl DownloadWorker {
    /// Create a new download worker
    pub fn new(
        id: u32,
        config: WorkerConfig,
        queue: TaskQueue,
        tools: MediaTools,
        identity: Arc<IdentityGuard>,
        outcome_tx: mpsc::Sender<TaskOutcome>,
    ) -> Self {
        Self {
            id,
            config,
            queue,
            tools,
            identity,
            outcome_tx,
            stats: WorkerStats::default(),
        }
    }

    /// Worker identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Process tasks until the queue is empty
    pub async fn run(mut self) -> WorkerResult<WorkerStats> {
        info!("Worker {} starting", self.id);
        let mut outcome_channel_open = true;

        while let Some(claimed) = self.queue.claim_next(self.id).await {
            let queued_for = chrono::Utc::now() - claimed.claimed_at;
            debug!(
                "Worker {} picked up {} ({} ms after claim)",
                self.id,
                claimed.task.label(),
                queued_for.num_milliseconds()
            );

            let outcome = self.process_task(&claimed.task).await;
            self.queue.mark_finished(&outcome.task_id).await;
            self.stats.record(outcome.status);

            // Backpressure: wait for room rather than dropping the outcome
            if outcome_channel_open && self.outcome_tx.send(outcome).await.is_err() {
                warn!("Worker {}: outcome channel closed, progress is no longer reported", self.id);
                outcome_channel_open = false;
            }
        }

        info!(
            "Worker {} finished: {} tasks ({} downloaded, {} skipped, {} failed)",
            self.id,
            self.stats.tasks_processed,
            self.stats.downloaded,
            self.stats.skipped,
            self.stats.failed
        );
        Ok(self.stats)
    }

    /// Run one task to its terminal outcome
    pub async fn process_task(&mut self, task: &DownloadTask) -> TaskOutcome {
        let label = task.label();

        if self.existing_file_is_valid(task).await {
            info!("Skipped {}: valid file already present", label);
            return self.outcome(task, OutcomeStatus::Skipped, "already downloaded", 0);
        }

        let max_attempts = self.config.max_retries;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let generation = self.identity.generation();

            match self.download(task).await {
                Ok(path) => {
                    info!("Downloaded {} -> {}", label, path.display());
                    return self.outcome(task, OutcomeStatus::Downloaded, "", attempt);
                }
                Err(e) if e.is_rate_limited() => {
                    self.stats.rate_limited_attempts += 1;
                    warn!(
                        "Worker {}: rate limited on {} (attempt {}/{}): {}",
                        self.id, label, attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        self.identity.rotate_if_stale(generation).await;
                        tokio::time::sleep(self.config.rate_limit_backoff).await;
                    }
                    last_error = Some(e);
                }
                Err(e) if self.config.retry_transient => {
                    warn!(
                        "Worker {}: {} failed (attempt {}/{}): {}",
                        self.id, label, attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        let delay = BackoffCalculator::retry_delay(
                            attempt,
                            self.config.retry_base_delay,
                            self.config.retry_max_delay,
                            self.config.backoff_jitter_percentage,
                        );
                        debug!("Worker {} retrying {} in {:?}", self.id, label, delay);
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Failed {}: {}", label, e);
                    return self.outcome(task, OutcomeStatus::Failed, e.to_string(), attempt);
                }
            }
        }

        let error = DownloadError::MaxRetriesExceeded {
            attempts: max_attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        };
        warn!("Failed {}: {}", label, error);
        self.outcome(task, OutcomeStatus::Failed, error.to_string(), max_attempts)
    }

    /// True if the target exists and its probed duration is within
    /// tolerance of the expected one
    async fn existing_file_is_valid(&self, task: &DownloadTask) -> bool {
        let Some(expected) = task.expected_duration_seconds else {
            return false;
        };

        let target = task.target_path();
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return false;
        }

        match self.tools.probe.probe(&target).await {
            Ok(actual) => {
                let difference = (actual - expected).abs();
                if difference <= self.config.duration_tolerance_seconds {
                    true
                } else {
                    debug!(
                        "{} is {:.2}s off the expected duration, downloading again",
                        target.display(),
                        difference
                    );
                    false
                }
            }
            Err(e) => {
                debug!("Cannot validate {}: {}", target.display(), e);
                false
            }
        }
    }

    /// Fetch, transcode and tag; the finished file only appears at the
    /// target path once everything succeeded
    ///
    /// All intermediate files live in the task's own scratch directory,
    /// which is removed afterwards whatever the result.
    async fn download(&self, task: &DownloadTask) -> WorkerResult<PathBuf> {
        let scratch = task.scratch_directory();
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.download_in(task, &scratch).await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            debug!("Could not remove scratch directory {}: {}", scratch.display(), e);
        }
        result
    }

    async fn download_in(&self, task: &DownloadTask, scratch: &Path) -> WorkerResult<PathBuf> {
        let raw = self.tools.fetcher.fetch(&task.link, scratch).await?;

        let staged = scratch.join(format!(
            "{}.transcoding.{}",
            task.file_stem(),
            paths::AUDIO_EXTENSION
        ));
        self.transcode_and_tag(task, &raw, &staged).await?;

        let target = task.target_path();
        tokio::fs::rename(&staged, &target).await?;
        Ok(target)
    }

    async fn transcode_and_tag(&self, task: &DownloadTask, raw: &Path, staged: &Path) -> WorkerResult<()> {
        self.tools.transcoder.transcode(raw, staged).await?;

        let tags = TrackTags {
            title: task.title.clone(),
            artist: task.artist.clone(),
            album: task.catalog.clone(),
        };
        self.tools.tagger.tag(staged, &tags).await
    }

    fn outcome(
        &self,
        task: &DownloadTask,
        status: OutcomeStatus,
        message: impl Into<String>,
        attempts: u32,
    ) -> TaskOutcome {
        TaskOutcome::new(self.id, task.task_id(), task.label(), status, message, attempts)
    }
}

/// Builder for creating DownloadWorker instances
#[derive(Debug, Default)]
pub struct DownloadWorkerBuilder {
    id: Option<u32>,
    config: Option<WorkerConfig>,
    queue: Option<TaskQueue>,
    tools: Option<MediaTools>,
    identity: Option<Arc<IdentityGuard>>,
    outcome_tx: Option<mpsc::Sender<TaskOutcome>>,
}

impl DownloadWorkerBuilder {
    /// Create a new worker builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set worker ID
    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Set worker configuration
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set task queue
    pub fn queue(mut self, queue: TaskQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set media capabilities
    pub fn tools(mut self, tools: MediaTools) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set identity guard; defaults to a disabled one
    pub fn identity(mut self, identity: Arc<IdentityGuard>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set outcome channel
    pub fn outcome_channel(mut self, outcome_tx: mpsc::Sender<TaskOutcome>) -> Self {
        self.outcome_tx = Some(outcome_tx);
        self
    }

    /// Build the worker
    pub fn build(self) -> WorkerResult<DownloadWorker> {
        let missing = |field: &str| DownloadError::ConfigurationError(format!("Worker {} is required", field));

        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(DownloadWorker::new(
            self.id.ok_or_else(|| missing("id"))?,
            config,
            self.queue.ok_or_else(|| missing("queue"))?,
            self.tools.ok_or_else(|| missing("tools"))?,
            self.identity
                .unwrap_or_else(|| Arc::new(IdentityGuard::disabled())),
            self.outcome_tx.ok_or_else(|| missing("outcome channel"))?,
        ))
    }
}
