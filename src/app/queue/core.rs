//! Core task queue implementation
//!
//! A first-in first-out queue of [`DownloadTask`]s shared by all workers.
//! Claiming never waits for work: a worker that finds the queue empty gets
//! `None` and exits. Each task is handed out at most once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::{ClaimedTask, QueueStats, TaskStatus};
use crate::app::models::DownloadTask;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<DownloadTask>,
    status: HashMap<String, TaskStatus>,
    stats: QueueStats,
}

impl QueueState {
    fn refresh_counts(&mut self) {
        self.stats.pending = self.pending.len() as u64;
        self.stats.claimed = self.status.values().filter(|s| s.is_claimed()).count() as u64;
        self.stats.finished = self.status.values().filter(|s| s.is_finished()).count() as u64;
    }
}

/// Shared queue of download tasks
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task
    ///
    /// # Returns
    ///
    /// `true` if the task was queued, `false` if the same task (same catalog
    /// and key) was already added
    pub async fn add_task(&self, task: DownloadTask) -> bool {
        let mut state = self.state.lock().await;
        let task_id = task.task_id();
        if state.status.contains_key(&task_id) {
            state.stats.duplicates += 1;
            debug!("Skipping duplicate task: {}", task_id);
            return false;
        }

        state.status.insert(task_id, TaskStatus::Pending);
        state.pending.push_back(task);
        state.stats.total_added += 1;
        state.refresh_counts();
        true
    }

    /// Add many tasks, returning how many were queued
    pub async fn add_tasks(&self, tasks: impl IntoIterator<Item = DownloadTask>) -> usize {
        let mut added = 0;
        let mut seen = HashSet::new();
        let mut state = self.state.lock().await;
        for task in tasks {
            let task_id = task.task_id();
            if state.status.contains_key(&task_id) || !seen.insert(task_id.clone()) {
                state.stats.duplicates += 1;
                continue;
            }
            state.status.insert(task_id, TaskStatus::Pending);
            state.pending.push_back(task);
            state.stats.total_added += 1;
            added += 1;
        }
        state.refresh_counts();

        info!(
            "Queued {} download tasks ({} duplicates skipped)",
            added, state.stats.duplicates
        );
        added
    }

    /// Claim the next pending task for `worker_id`; `None` when empty
    pub async fn claim_next(&self, worker_id: u32) -> Option<ClaimedTask> {
        let lock_start = std::time::Instant::now();
        let mut state = self.state.lock().await;

        let lock_duration = lock_start.elapsed();
        if lock_duration > Duration::from_millis(10) {
            debug!("Queue lock contention detected: {:?} wait time", lock_duration);
        }

        let task = state.pending.pop_front()?;
        let claimed_at = Utc::now();
        state.status.insert(
            task.task_id(),
            TaskStatus::Claimed {
                worker_id,
                claimed_at,
            },
        );
        state.refresh_counts();

        debug!("Worker {} claimed {}", worker_id, task.task_id());
        Some(ClaimedTask {
            task,
            worker_id,
            claimed_at,
        })
    }

    /// Record that a claimed task reached a terminal outcome
    pub async fn mark_finished(&self, task_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(status) = state.status.get_mut(task_id) {
            *status = TaskStatus::Finished {
                finished_at: Utc::now(),
            };
        }
        state.refresh_counts();
    }

    /// Status of a task, if it was ever added
    pub async fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.state.lock().await.status.get(task_id).cloned()
    }

    /// Current counters
    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.stats.clone()
    }

    /// Number of pending tasks
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// True if no task is waiting to be claimed
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    /// Drop every pending task so workers exit after their current one
    ///
    /// Claimed tasks are unaffected. Returns the number of tasks dropped.
    pub async fn close(&self) -> usize {
        let mut state = self.state.lock().await;
        let dropped: Vec<DownloadTask> = state.pending.drain(..).collect();
        for task in &dropped {
            state.status.remove(&task.task_id());
        }
        state.stats.discarded += dropped.len() as u64;
        state.refresh_counts();

        if !dropped.is_empty() {
            info!("Queue closed, {} pending tasks dropped", dropped.len());
        }
        dropped.len()
    }
}
