//! Core data structures for the download task queue

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::models::DownloadTask;

/// Status of a task in the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    /// Waiting to be claimed by a worker
    Pending,
    /// Claimed by a worker and being processed
    Claimed {
        worker_id: u32,
        claimed_at: DateTime<Utc>,
    },
    /// Worker reported a terminal outcome
    Finished { finished_at: DateTime<Utc> },
}

impl TaskStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Pending)
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, TaskStatus::Claimed { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Finished { .. })
    }
}

/// A task as handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    /// The download to perform
    pub task: DownloadTask,
    /// Worker that owns it
    pub worker_id: u32,
    /// When it was claimed
    pub claimed_at: DateTime<Utc>,
}

impl ClaimedTask {
    /// Queue identity of the task
    pub fn task_id(&self) -> String {
        self.task.task_id()
    }
}

/// Queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks accepted into the queue
    pub total_added: u64,
    /// Tasks rejected because the same task was already queued
    pub duplicates: u64,
    /// Tasks waiting to be claimed
    pub pending: u64,
    /// Tasks currently claimed
    pub claimed: u64,
    /// Tasks with a terminal outcome
    pub finished: u64,
    /// Pending tasks dropped when the queue was closed
    pub discarded: u64,
}

impl QueueStats {
    /// Share of accepted tasks that have finished, in percent
    pub fn completion_percentage(&self) -> f64 {
        if self.total_added == 0 {
            return 100.0;
        }
        (self.finished as f64 / self.total_added as f64) * 100.0
    }

    /// True once nothing is pending or claimed
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.claimed == 0
    }
}
