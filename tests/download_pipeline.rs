//! Download stage tests: the coordinator and worker pool driven with
//! in-memory media tools

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use playlist_fetcher::app::coordinator::{Coordinator, CoordinatorConfig, ProgressObserver, ProgressSnapshot};
use playlist_fetcher::app::identity::{IdentityGuard, IdentityRotator};
use playlist_fetcher::app::provider::{
    AudioTagger, DurationProbe, MediaFetcher, MediaTools, TrackTags, Transcoder,
};
use playlist_fetcher::app::worker::{OutcomeStatus, TaskOutcome, WorkerConfigBuilder};
use playlist_fetcher::app::DownloadTask;
use playlist_fetcher::errors::{DownloadResult, IdentityResult, ProviderError, ProviderResult};

/// Writes a small raw file per link, after raising scripted errors
#[derive(Default)]
struct FakeFetcher {
    failures: Mutex<HashMap<String, Vec<String>>>,
    calls: AtomicU32,
}

impl FakeFetcher {
    fn failing(link: &str, messages: &[&str]) -> Self {
        let fetcher = Self::default();
        fetcher.failures.lock().unwrap().insert(
            link.to_string(),
            messages.iter().map(|m| m.to_string()).collect(),
        );
        fetcher
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, link: &str, dest_dir: &Path) -> ProviderResult<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut failures = self.failures.lock().unwrap();
            failures
                .get_mut(link)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };
        if let Some(message) = next {
            return Err(ProviderError::from_message(message));
        }

        let id = link.rsplit('=').next().unwrap_or("raw");
        let path = dest_dir.join(format!("{}.webm", id));
        tokio::fs::write(&path, link.as_bytes()).await?;
        Ok(path)
    }
}

/// Copies the raw file, optionally pausing first so tasks overlap
#[derive(Default)]
struct CopyTranscoder {
    delay: Duration,
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> ProviderResult<()> {
        tokio::time::sleep(self.delay).await;
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTagger(Mutex<Vec<TrackTags>>);

#[async_trait]
impl AudioTagger for RecordingTagger {
    async fn tag(&self, _path: &Path, tags: &TrackTags) -> DownloadResult<()> {
        self.0.lock().unwrap().push(tags.clone());
        Ok(())
    }
}

/// Reports the same duration for every file
struct FixedProbe(f64);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn probe(&self, _path: &Path) -> DownloadResult<f64> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct CountingRotator(AtomicU32);

#[async_trait]
impl IdentityRotator for CountingRotator {
    async fn rotate(&self) -> IdentityResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver(Mutex<Vec<TaskOutcome>>);

impl ProgressObserver for RecordingObserver {
    fn on_outcome(&self, outcome: &TaskOutcome, _snapshot: &ProgressSnapshot) {
        self.0.lock().unwrap().push(outcome.clone());
    }
}

fn tasks(root: &Path, count: usize) -> Vec<DownloadTask> {
    (0..count)
        .map(|i| DownloadTask {
            artist: "Artist".to_string(),
            title: format!("Song {}", i),
            link: format!("https://www.youtube.com/watch?v=vid{:02}", i),
            matched_title: format!("Artist - Song {} (Official Audio)", i),
            expected_duration_seconds: Some(200.0),
            output_directory: root.join("mix"),
            catalog: "mix".to_string(),
        })
        .collect()
}

fn coordinator(
    root: &Path,
    fetcher: Arc<FakeFetcher>,
    probe_seconds: f64,
    identity: Arc<IdentityGuard>,
) -> Coordinator {
    coordinator_with(root, fetcher, CopyTranscoder::default(), 3, probe_seconds, identity)
}

fn coordinator_with(
    root: &Path,
    fetcher: Arc<FakeFetcher>,
    transcoder: CopyTranscoder,
    workers: usize,
    probe_seconds: f64,
    identity: Arc<IdentityGuard>,
) -> Coordinator {
    let worker_config = WorkerConfigBuilder::new()
        .worker_count(workers)
        .rate_limit_backoff(Duration::ZERO)
        .build()
        .unwrap();
    let tools = MediaTools::new(
        fetcher,
        Arc::new(transcoder),
        Arc::new(RecordingTagger::default()),
        Arc::new(FixedProbe(probe_seconds)),
    );
    Coordinator::new(
        CoordinatorConfig::default()
            .with_downloads_dir(root)
            .with_worker_config(worker_config)
            .with_stop_on_signal(false),
        tools,
        identity,
    )
}

#[tokio::test]
async fn test_every_task_reports_exactly_one_outcome() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::default());
    let observer = Arc::new(RecordingObserver::default());
    let coordinator = coordinator(dir.path(), fetcher.clone(), 200.0, Arc::new(IdentityGuard::disabled()))
        .with_observer(observer.clone());

    let work = tasks(dir.path(), 10);
    let result = coordinator.run_tasks(work.clone()).await.unwrap();

    assert_eq!(result.total_tasks, 10);
    assert_eq!(result.downloaded, 10);
    assert!(result.is_success());
    assert_eq!(fetcher.calls(), 10);

    let outcomes = observer.0.lock().unwrap().clone();
    assert_eq!(outcomes.len(), 10);
    let ids: HashSet<_> = outcomes.iter().map(|o| o.task_id.clone()).collect();
    assert_eq!(ids.len(), 10);

    for task in &work {
        assert!(task.target_path().exists(), "missing {}", task.target_path().display());
    }
    // Raw media never lingers next to finished files
    let partial: Vec<_> = std::fs::read_dir(work[0].partial_directory()).unwrap().collect();
    assert!(partial.is_empty());
}

#[tokio::test]
async fn test_tasks_sharing_a_link_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let mut work = tasks(dir.path(), 2);
    for task in &mut work {
        task.link = "https://www.youtube.com/watch?v=same".to_string();
        task.matched_title = "Artist - Medley (Official Audio)".to_string();
    }

    let fetcher = Arc::new(FakeFetcher::default());
    let transcoder = CopyTranscoder {
        delay: Duration::from_millis(50),
    };
    let coordinator = coordinator_with(
        dir.path(),
        fetcher.clone(),
        transcoder,
        2,
        200.0,
        Arc::new(IdentityGuard::disabled()),
    );
    let result = coordinator.run_tasks(work.clone()).await.unwrap();

    assert_eq!(result.failed, 0, "failures: {:?}", result.failures);
    assert_eq!(result.downloaded, 2);
    assert_eq!(fetcher.calls(), 2);
    for task in &work {
        assert!(task.target_path().exists());
        assert!(!task.scratch_directory().exists());
    }
}

#[tokio::test]
async fn test_second_run_skips_valid_files() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::default());
    let coordinator = coordinator(dir.path(), fetcher.clone(), 201.5, Arc::new(IdentityGuard::disabled()));

    let work = tasks(dir.path(), 6);
    let first = coordinator.run_tasks(work.clone()).await.unwrap();
    assert_eq!(first.downloaded, 6);

    let second = coordinator.run_tasks(work).await.unwrap();
    assert_eq!(second.skipped, 6);
    assert_eq!(second.downloaded, 0);
    assert_eq!(fetcher.calls(), 6);
}

#[tokio::test]
async fn test_duration_tolerance_boundary() {
    let dir = TempDir::new().unwrap();
    let work = tasks(dir.path(), 1);
    std::fs::create_dir_all(&work[0].output_directory).unwrap();
    std::fs::write(work[0].target_path(), b"old audio").unwrap();

    // Exactly at the tolerance: kept
    let fetcher = Arc::new(FakeFetcher::default());
    let at_limit = coordinator(dir.path(), fetcher.clone(), 203.0, Arc::new(IdentityGuard::disabled()));
    let result = at_limit.run_tasks(work.clone()).await.unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(fetcher.calls(), 0);

    // Just past it: replaced
    let past_limit = coordinator(dir.path(), fetcher.clone(), 203.01, Arc::new(IdentityGuard::disabled()));
    let result = past_limit.run_tasks(work.clone()).await.unwrap();
    assert_eq!(result.downloaded, 1);
    assert_eq!(fetcher.calls(), 1);
    assert_ne!(std::fs::read(work[0].target_path()).unwrap(), b"old audio");
}

#[tokio::test]
async fn test_rate_limited_download_rotates_and_succeeds() {
    let dir = TempDir::new().unwrap();
    let work = tasks(dir.path(), 1);
    let fetcher = Arc::new(FakeFetcher::failing(&work[0].link, &["HTTP Error 429: Too Many Requests"; 2]));
    let rotator = Arc::new(CountingRotator::default());
    let identity = Arc::new(IdentityGuard::with_min_interval(rotator.clone(), Duration::ZERO));
    let observer = Arc::new(RecordingObserver::default());

    let coordinator = coordinator(dir.path(), fetcher.clone(), 200.0, identity).with_observer(observer.clone());
    let result = coordinator.run_tasks(work).await.unwrap();

    assert_eq!(result.downloaded, 1);
    assert_eq!(result.rotations, 2);
    assert_eq!(rotator.0.load(Ordering::SeqCst), 2);
    assert_eq!(fetcher.calls(), 3);

    let outcomes = observer.0.lock().unwrap().clone();
    assert_eq!(outcomes[0].attempts, 3);
    assert_eq!(outcomes[0].status, OutcomeStatus::Downloaded);
}

#[tokio::test]
async fn test_failed_task_does_not_stop_others() {
    let dir = TempDir::new().unwrap();
    let work = tasks(dir.path(), 4);
    let fetcher = Arc::new(FakeFetcher::failing(&work[2].link, &["ERROR: Video unavailable"]));
    let coordinator = coordinator(dir.path(), fetcher.clone(), 200.0, Arc::new(IdentityGuard::disabled()));

    let result = coordinator.run_tasks(work.clone()).await.unwrap();

    assert_eq!(result.downloaded, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failures[0].0, work[2].label());
    assert!(!result.is_success());
    assert!(!work[2].target_path().exists());
}
