//! Terminal progress display for the resolve and download stages
//!
//! Both displays are observers: the library reports progress through
//! [`ResolveObserver`] and [`ProgressObserver`] and these types render it
//! with indicatif. When stderr is not a terminal they fall back to plain
//! text lines, one per finished item.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playlist_fetcher::cli::{DownloadProgress, ProgressConfig};
//!
//! let display = Arc::new(DownloadProgress::new(ProgressConfig::default(), 4));
//! // coordinator.with_observer(display.clone())
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

use crate::app::coordinator::{ProgressObserver, ProgressSnapshot};
use crate::app::models::TrackRecord;
use crate::app::resolver::{ResolveObserver, ResolveSummary, TrackOutcome};
use crate::app::worker::{OutcomeStatus, TaskOutcome};
use crate::constants::progress::{MAIN_BAR_TEMPLATE, PROGRESS_CHARS, WORKER_TEMPLATE};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// Show one line per download worker
    pub show_worker_details: bool,
    /// Suppress all progress output
    pub quiet: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            show_worker_details: true,
            quiet: false,
        }
    }
}

impl ProgressConfig {
    /// Configuration derived from the global `--quiet` flag
    pub fn for_quiet(quiet: bool) -> Self {
        Self {
            quiet,
            ..Default::default()
        }
    }

    fn use_bars(&self) -> bool {
        self.enable_progress_bars && !self.quiet && atty::is(atty::Stream::Stderr)
    }
}

fn main_bar(multi: &MultiProgress, len: u64, message: &str) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(len));
    bar.set_style(
        ProgressStyle::default_bar()
            .template(MAIN_BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(PROGRESS_CHARS),
    );
    bar.set_message(message.to_string());
    bar
}

fn worker_spinner(multi: &MultiProgress, worker_id: u32) -> ProgressBar {
    let spinner = multi.add(ProgressBar::new_spinner());
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(WORKER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_prefix((worker_id + 1).to_string());
    spinner.set_message("Waiting...");
    spinner
}

fn outcome_marker(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Downloaded => "✓",
        OutcomeStatus::Skipped => "·",
        OutcomeStatus::Failed => "✗",
    }
}

struct DownloadBars {
    main: ProgressBar,
    workers: HashMap<u32, ProgressBar>,
}

/// Progress display for a download session
pub struct DownloadProgress {
    config: ProgressConfig,
    worker_count: usize,
    multi: MultiProgress,
    bars: Mutex<Option<DownloadBars>>,
}

impl DownloadProgress {
    /// Create a display for a pool of `worker_count` workers
    pub fn new(config: ProgressConfig, worker_count: usize) -> Self {
        let multi = MultiProgress::new();
        if config.quiet {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self {
            config,
            worker_count,
            multi,
            bars: Mutex::new(None),
        }
    }
}

impl ProgressObserver for DownloadProgress {
    fn on_start(&self, total: usize) {
        if self.config.quiet {
            return;
        }
        if !self.config.use_bars() {
            eprintln!(
                "Starting download of {} tracks with {} workers...",
                total, self.worker_count
            );
            return;
        }

        let main = main_bar(&self.multi, total as u64, "Downloading tracks");
        let mut workers = HashMap::new();
        if self.config.show_worker_details {
            for id in 0..self.worker_count as u32 {
                workers.insert(id, worker_spinner(&self.multi, id));
            }
        }
        if let Ok(mut bars) = self.bars.lock() {
            *bars = Some(DownloadBars { main, workers });
        }
        debug!("Progress display started for {} tasks", total);
    }

    fn on_outcome(&self, outcome: &TaskOutcome, snapshot: &ProgressSnapshot) {
        if self.config.quiet {
            return;
        }
        let line = format!("{} {}", outcome_marker(outcome.status), outcome.summary());

        let bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(_) => return,
        };
        match bars.as_ref() {
            Some(bars) => {
                bars.main.set_position(snapshot.completed as u64);
                if let Some(spinner) = bars.workers.get(&outcome.worker_id) {
                    spinner.set_message(line);
                    spinner.tick();
                }
            }
            None => eprintln!(
                "[{}/{}] {}",
                snapshot.completed, snapshot.total, line
            ),
        }
    }

    fn on_finish(&self, snapshot: &ProgressSnapshot) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bars) = bars.take() {
                bars.main.finish_with_message("Download completed");
                for spinner in bars.workers.values() {
                    spinner.finish_and_clear();
                }
            }
        }
        debug!(
            "Progress display finished at {:.1}%",
            snapshot.percentage()
        );
    }
}

/// Progress display for a resolve run
pub struct ResolveProgress {
    config: ProgressConfig,
    multi: MultiProgress,
    bar: Mutex<Option<ProgressBar>>,
}

impl ResolveProgress {
    pub fn new(config: ProgressConfig) -> Self {
        let multi = MultiProgress::new();
        if config.quiet {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self {
            config,
            multi,
            bar: Mutex::new(None),
        }
    }
}

impl ResolveObserver for ResolveProgress {
    fn on_start(&self, catalog: &str, pending: usize) {
        if self.config.quiet {
            return;
        }
        if !self.config.use_bars() {
            eprintln!("Resolving {} tracks for '{}'...", pending, catalog);
            return;
        }
        let bar = main_bar(&self.multi, pending as u64, &format!("Resolving {}", catalog));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_track(&self, track: &TrackRecord, outcome: &TrackOutcome) {
        if self.config.quiet {
            return;
        }
        let line = match outcome {
            TrackOutcome::Resolved { link } => format!("✓ {} -> {}", track.query(), link),
            TrackOutcome::NotFound { reason } => format!("✗ {} (not found: {})", track.query(), reason),
            TrackOutcome::Skipped => format!("· {} (already handled)", track.query()),
            TrackOutcome::StorageFailed { error } => {
                format!("! {} (ledger write failed: {})", track.query(), error)
            }
        };

        let slot = match self.bar.lock() {
            Ok(slot) => slot,
            Err(_) => return,
        };
        match slot.as_ref() {
            Some(bar) => {
                bar.inc(1);
                bar.println(line);
            }
            None => eprintln!("{}", line),
        }
    }

    fn on_finish(&self, summary: &ResolveSummary) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        if !self.config.quiet {
            eprintln!(
                "'{}': {} resolved, {} not found, {} already in ledger ({} searches, {} rate limited)",
                summary.catalog,
                summary.resolved,
                summary.not_found,
                summary.already_resolved,
                summary.searches,
                summary.rate_limited
            );
        }
    }
}
