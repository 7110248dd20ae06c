//! Worker type definitions
//!
//! Task outcomes emitted by workers and the per-worker counters returned when
//! a worker exits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::DownloadError;

/// Terminal status of one download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutcomeStatus {
    /// An existing file passed validation; nothing was fetched
    Skipped,
    /// The file was fetched, transcoded and tagged
    Downloaded,
    /// The task gave up
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeStatus::Skipped => "Skipped",
            OutcomeStatus::Downloaded => "Downloaded",
            OutcomeStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Event emitted by a worker when a task reaches its terminal status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    /// Worker that processed the task
    pub worker_id: u32,
    /// Queue identity of the task
    pub task_id: String,
    /// Human-readable task label (`artist - title`)
    pub label: String,
    pub status: OutcomeStatus,
    /// Short description, the error message for failures
    pub message: String,
    /// Attempts made (0 when skipped)
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl TaskOutcome {
    /// Build an outcome stamped with the current time
    pub fn new(
        worker_id: u32,
        task_id: impl Into<String>,
        label: impl Into<String>,
        status: OutcomeStatus,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            worker_id,
            task_id: task_id.into(),
            label: label.into(),
            status,
            message: message.into(),
            attempts,
            timestamp: Utc::now(),
        }
    }

    /// One-line description for progress displays
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            format!("{}: {}", self.status, self.label)
        } else {
            format!("{}: {} ({})", self.status, self.label, self.message)
        }
    }
}

/// Counters kept by a single worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub skipped: u64,
    pub downloaded: u64,
    pub failed: u64,
    /// Attempts that failed with a rate limit
    pub rate_limited_attempts: u64,
}

impl WorkerStats {
    /// Count a finished task
    pub fn record(&mut self, status: OutcomeStatus) {
        self.tasks_processed += 1;
        match status {
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Downloaded => self.downloaded += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
    }

    /// Add another worker's counters
    pub fn merge(&mut self, other: &WorkerStats) {
        self.tasks_processed += other.tasks_processed;
        self.skipped += other.skipped;
        self.downloaded += other.downloaded;
        self.failed += other.failed;
        self.rate_limited_attempts += other.rate_limited_attempts;
    }
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_summary() {
        let outcome = TaskOutcome::new(2, "mix/a - b", "A - B", OutcomeStatus::Failed, "HTTP 403", 1);
        assert_eq!(outcome.summary(), "Failed: A - B (HTTP 403)");

        let outcome = TaskOutcome::new(2, "mix/a - b", "A - B", OutcomeStatus::Skipped, "", 0);
        assert_eq!(outcome.summary(), "Skipped: A - B");
    }

    #[test]
    fn test_stats_record_and_merge() {
        let mut a = WorkerStats::default();
        a.record(OutcomeStatus::Downloaded);
        a.record(OutcomeStatus::Failed);

        let mut b = WorkerStats::default();
        b.record(OutcomeStatus::Skipped);
        b.rate_limited_attempts = 2;

        a.merge(&b);
        assert_eq!(a.tasks_processed, 3);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.downloaded, 1);
        assert_eq!(a.failed, 1);
        assert_eq!(a.rate_limited_attempts, 2);
    }
}
