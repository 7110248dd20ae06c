//! Download session results

use std::time::Duration;

use serde::Serialize;

use super::progress::ProgressSnapshot;

/// Final result of a download session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionResult {
    /// Catalogs whose ledgers fed the session
    pub catalogs: Vec<String>,
    /// Tasks queued
    pub total_tasks: usize,
    /// Ledger rows without a link (`NOT FOUND`), which produce no task
    pub not_found_rows: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Label and error of every failed task
    pub failures: Vec<(String, String)>,
    /// Pending tasks dropped because the session was stopped
    pub dropped: usize,
    /// Workers that returned an error or panicked
    pub worker_failures: usize,
    /// Identity rotations performed during the session
    pub rotations: u64,
    /// Session stopped by a signal
    pub interrupted: bool,
    /// Time taken for the entire session
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
}

impl SessionResult {
    /// Fill the outcome counters from the aggregator's final snapshot
    pub fn apply_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        self.skipped = snapshot.skipped;
        self.downloaded = snapshot.downloaded;
        self.failed = snapshot.failed;
        self.failures = snapshot.failures.clone();
    }

    /// Tasks that reported an outcome
    pub fn processed(&self) -> usize {
        self.skipped + self.downloaded + self.failed
    }

    /// True if every task ended in a file on disk and no worker died
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.worker_failures == 0 && !self.interrupted
    }
}
