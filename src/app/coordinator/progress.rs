//! Progress aggregation
//!
//! The aggregator consumes [`TaskOutcome`]s from the workers' bounded channel
//! and keeps the running totals a display needs. It only observes: workers
//! are never slowed beyond the channel's own backpressure, and every outcome
//! sent is counted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::worker::{OutcomeStatus, TaskOutcome};

/// Receives progress updates; all methods default to no-ops
pub trait ProgressObserver: Send + Sync {
    /// Downloading `total` tasks is starting
    fn on_start(&self, _total: usize) {}

    /// A task reached its terminal outcome
    fn on_outcome(&self, _outcome: &TaskOutcome, _snapshot: &ProgressSnapshot) {}

    /// Every worker has returned
    fn on_finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressObserver;

impl ProgressObserver for NoopProgressObserver {}

/// Aggregated progress at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Tasks queued for the session
    pub total: usize,
    /// Tasks with a terminal outcome
    pub completed: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Last message seen from each worker
    pub last_messages: BTreeMap<u32, String>,
    /// Label and error of every failed task, in arrival order
    pub failures: Vec<(String, String)>,
}

impl ProgressSnapshot {
    /// Snapshot for a session of `total` tasks
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Fold one outcome into the totals
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.completed += 1;
        match outcome.status {
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Downloaded => self.downloaded += 1,
            OutcomeStatus::Failed => {
                self.failed += 1;
                self.failures
                    .push((outcome.label.clone(), outcome.message.clone()));
            }
        }
        self.last_messages
            .insert(outcome.worker_id, outcome.summary());
    }

    /// Completion in percent
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    /// True once every task has reported
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Consumes worker outcomes and feeds an observer
pub struct ProgressAggregator {
    snapshot: ProgressSnapshot,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressAggregator {
    /// Create an aggregator for `total` tasks
    pub fn new(total: usize, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            snapshot: ProgressSnapshot::new(total),
            observer,
        }
    }

    /// Current totals
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Fold one outcome in and notify the observer
    pub fn process(&mut self, outcome: TaskOutcome) {
        self.snapshot.record(&outcome);
        debug!(
            "Progress {}/{}: worker {} {}",
            self.snapshot.completed,
            self.snapshot.total,
            outcome.worker_id,
            outcome.summary()
        );
        self.observer.on_outcome(&outcome, &self.snapshot);
    }

    /// Drain `outcome_rx` until every sender is gone, then return the totals
    pub async fn run(mut self, mut outcome_rx: mpsc::Receiver<TaskOutcome>) -> ProgressSnapshot {
        self.observer.on_start(self.snapshot.total);
        while let Some(outcome) = outcome_rx.recv().await {
            self.process(outcome);
        }
        debug!("Outcome channel closed");
        self.observer.on_finish(&self.snapshot);
        self.snapshot
    }

    /// Run on a background task
    pub fn start(self, outcome_rx: mpsc::Receiver<TaskOutcome>) -> JoinHandle<ProgressSnapshot> {
        tokio::spawn(self.run(outcome_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressObserver for Recorder {
        fn on_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {}", total));
        }

        fn on_outcome(&self, outcome: &TaskOutcome, snapshot: &ProgressSnapshot) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {}/{}", outcome.status, snapshot.completed, snapshot.total));
        }

        fn on_finish(&self, snapshot: &ProgressSnapshot) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {}", snapshot.completed));
        }
    }

    fn outcome(worker_id: u32, status: OutcomeStatus, label: &str) -> TaskOutcome {
        TaskOutcome::new(worker_id, label, label, status, "boom", 1)
    }

    #[test]
    fn test_snapshot_record() {
        let mut snapshot = ProgressSnapshot::new(4);
        snapshot.record(&outcome(0, OutcomeStatus::Downloaded, "a"));
        snapshot.record(&outcome(1, OutcomeStatus::Failed, "b"));
        snapshot.record(&outcome(0, OutcomeStatus::Skipped, "c"));

        assert_eq!(snapshot.completed, 3);
        assert_eq!(snapshot.downloaded, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.failures, vec![("b".to_string(), "boom".to_string())]);
        assert_eq!(snapshot.last_messages[&0], "Skipped: c (boom)");
        assert_eq!(snapshot.percentage(), 75.0);
        assert!(!snapshot.is_complete());
    }

    #[tokio::test]
    async fn test_aggregator_counts_every_outcome() {
        let recorder = Arc::new(Recorder::default());
        let aggregator = ProgressAggregator::new(20, recorder.clone());

        // A tiny buffer forces producers to wait on the aggregator
        let (tx, rx) = mpsc::channel(1);
        let handle = aggregator.start(rx);

        let mut producers = Vec::new();
        for worker_id in 0..4u32 {
            let tx = tx.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..5 {
                    let label = format!("w{}-{}", worker_id, i);
                    tx.send(outcome(worker_id, OutcomeStatus::Downloaded, &label))
                        .await
                        .unwrap();
                }
            }));
        }
        drop(tx);
        for producer in producers {
            producer.await.unwrap();
        }

        let snapshot = handle.await.unwrap();
        assert_eq!(snapshot.completed, 20);
        assert_eq!(snapshot.downloaded, 20);
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.last_messages.len(), 4);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().unwrap(), "start 20");
        assert_eq!(events.last().unwrap(), "finish 20");
        assert_eq!(events.len(), 22);
    }
}
