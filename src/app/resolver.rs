//! Resolver
//!
//! Drives the candidate selector against the search provider for every track
//! of a catalog that has no ledger row yet, writing each outcome to the
//! ledger as soon as it is known.
//!
//! Per track the state machine is
//! `Unresolved -> Searching -> [RateLimited -> Searching]* -> Resolved | NotFound`.
//! Both terminal states are written to the ledger and are final for the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::app::catalog::Catalog;
use crate::app::identity::{IdentityGuard, RotationOutcome};
use crate::app::ledger::{AppendOutcome, ClaimStatus, Ledger};
use crate::app::models::{Candidate, ResolutionRecord, TrackRecord};
use crate::app::provider::SearchProvider;
use crate::app::selector::select_best;
use crate::constants::limits::{MAX_RETRIES, RATE_LIMIT_BACKOFF};
use crate::constants::workers::{DEFAULT_RESOLVER_CONCURRENCY, MAX_WORKER_COUNT};
use crate::errors::{ConfigError, ProviderError, Result};

/// Resolver settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Total search attempts per track when rate limited
    pub max_retries: u32,
    /// Wait after a rate-limited search before the next attempt
    pub rate_limit_backoff: Duration,
    /// Tracks resolved at the same time
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            concurrency: DEFAULT_RESOLVER_CONCURRENCY,
        }
    }
}

impl ResolverConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.max_retries".to_string(),
                value: "0".to_string(),
                reason: "at least one search attempt is required".to_string(),
            });
        }
        if self.concurrency == 0 || self.concurrency > MAX_WORKER_COUNT {
            return Err(ConfigError::InvalidValue {
                field: "resolver.concurrency".to_string(),
                value: self.concurrency.to_string(),
                reason: format!("must be between 1 and {}", MAX_WORKER_COUNT),
            });
        }
        Ok(())
    }
}

/// Terminal result for one track in this run
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// A candidate was chosen and recorded
    Resolved { link: String },
    /// `NOT FOUND` was recorded
    NotFound { reason: String },
    /// Another task holds or already wrote this key
    Skipped,
    /// The ledger row could not be written; the key stays unresolved
    StorageFailed { error: String },
}

/// Counters for one resolve run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Ledger the run wrote into
    pub catalog: String,
    /// Unique tracks in the catalog
    pub total_tracks: usize,
    /// Tracks that already had a ledger row at start
    pub already_resolved: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub storage_failures: usize,
    /// Search calls made, including retries
    pub searches: u32,
    /// Searches that came back rate limited
    pub rate_limited: u32,
}

impl ResolveSummary {
    /// Tracks that reached a terminal outcome in this run
    pub fn processed(&self) -> usize {
        self.resolved + self.not_found + self.skipped + self.storage_failures
    }

    fn record(&mut self, report: &TrackReport) {
        self.searches += report.searches;
        self.rate_limited += report.rate_limited;
        match report.outcome {
            TrackOutcome::Resolved { .. } => self.resolved += 1,
            TrackOutcome::NotFound { .. } => self.not_found += 1,
            TrackOutcome::Skipped => self.skipped += 1,
            TrackOutcome::StorageFailed { .. } => self.storage_failures += 1,
        }
    }
}

/// Receives resolver progress; all methods default to no-ops
pub trait ResolveObserver: Send + Sync {
    /// Resolution of `pending` tracks is starting
    fn on_start(&self, _catalog: &str, _pending: usize) {}

    /// A track reached its terminal outcome
    fn on_track(&self, _track: &TrackRecord, _outcome: &TrackOutcome) {}

    /// The run is over
    fn on_finish(&self, _summary: &ResolveSummary) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolveObserver;

impl ResolveObserver for NoopResolveObserver {}

#[derive(Debug)]
struct TrackReport {
    outcome: TrackOutcome,
    searches: u32,
    rate_limited: u32,
}

impl TrackReport {
    fn new(outcome: TrackOutcome) -> Self {
        Self {
            outcome,
            searches: 0,
            rate_limited: 0,
        }
    }
}

#[derive(Debug)]
struct SearchReport {
    result: std::result::Result<Vec<Candidate>, ProviderError>,
    searches: u32,
    rate_limited: u32,
}

/// Resolves catalog tracks into ledger rows
pub struct Resolver {
    ledger: Arc<Ledger>,
    search: Arc<dyn SearchProvider>,
    identity: Arc<IdentityGuard>,
    config: ResolverConfig,
    observer: Arc<dyn ResolveObserver>,
}

impl Resolver {
    /// Create a resolver
    pub fn new(
        ledger: Arc<Ledger>,
        search: Arc<dyn SearchProvider>,
        identity: Arc<IdentityGuard>,
        config: ResolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger,
            search,
            identity,
            config,
            observer: Arc::new(NoopResolveObserver),
        })
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ResolveObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Tracks of `catalog` without a row in its ledger, de-duplicated, in
    /// catalog order
    pub async fn unresolved(&self, catalog: &Catalog) -> Result<Vec<TrackRecord>> {
        let resolved = self.ledger.load_resolved_keys(&catalog.name).await?;
        let mut seen = HashSet::new();
        Ok(catalog
            .tracks
            .iter()
            .filter(|track| {
                let key = track.key();
                !resolved.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect())
    }

    /// Resolve every unresolved track of `catalog` into the ledger named
    /// after it
    pub async fn resolve_catalog(&self, catalog: &Catalog) -> Result<ResolveSummary> {
        let pending = self.unresolved(catalog).await?;

        let mut summary = ResolveSummary {
            catalog: catalog.name.clone(),
            total_tracks: catalog.len(),
            already_resolved: catalog.len().saturating_sub(pending.len()),
            ..Default::default()
        };

        info!(
            "Catalog '{}': {} tracks, {} already resolved, {} to resolve",
            catalog.name,
            summary.total_tracks,
            summary.already_resolved,
            pending.len()
        );
        self.observer.on_start(&catalog.name, pending.len());

        let ledger_name = catalog.name.as_str();
        let mut reports = stream::iter(pending)
            .map(|track| async move {
                let report = self.resolve_track(ledger_name, &track).await;
                (track, report)
            })
            .buffer_unordered(self.config.concurrency);

        while let Some((track, report)) = reports.next().await {
            self.observer.on_track(&track, &report.outcome);
            summary.record(&report);
        }

        info!(
            "Catalog '{}' done: {} resolved, {} not found, {} storage failures",
            summary.catalog, summary.resolved, summary.not_found, summary.storage_failures
        );
        self.observer.on_finish(&summary);
        Ok(summary)
    }

    async fn resolve_track(&self, ledger_name: &str, track: &TrackRecord) -> TrackReport {
        let key = track.key();

        // Claim before the first network call so a concurrent attempt at the
        // same key skips instead of searching twice
        let _claim = match self.ledger.try_claim(ledger_name, &key).await {
            Ok(ClaimStatus::Claimed(guard)) => guard,
            Ok(ClaimStatus::AlreadyResolved) | Ok(ClaimStatus::ClaimedByOther) => {
                debug!("Skipping {}: resolved or in flight", key);
                return TrackReport::new(TrackOutcome::Skipped);
            }
            Err(e) => {
                warn!("Ledger unavailable for {}: {}", key, e);
                return TrackReport::new(TrackOutcome::StorageFailed {
                    error: e.to_string(),
                });
            }
        };

        let query = track.query();
        let search = self.search_with_retries(&query).await;

        let (record, reason) = match &search.result {
            Ok(candidates) => match select_best(candidates, track.expected_duration_seconds) {
                Ok(candidate) => (ResolutionRecord::found(track, candidate), None),
                Err(e) => (ResolutionRecord::not_found(track), Some(e.to_string())),
            },
            Err(e) => (ResolutionRecord::not_found(track), Some(e.to_string())),
        };

        let outcome = match self.ledger.append(ledger_name, record.clone()).await {
            Ok(AppendOutcome::Written) => match (record.link.url(), reason) {
                (Some(link), _) => {
                    info!("Resolved '{}' -> {}", query, link);
                    TrackOutcome::Resolved {
                        link: link.to_string(),
                    }
                }
                (None, reason) => {
                    let reason = reason.unwrap_or_default();
                    info!("NOT FOUND '{}': {}", query, reason);
                    TrackOutcome::NotFound { reason }
                }
            },
            Ok(AppendOutcome::Duplicate) => TrackOutcome::Skipped,
            Err(e) => {
                warn!("Failed to record '{}', it stays unresolved: {}", query, e);
                TrackOutcome::StorageFailed {
                    error: e.to_string(),
                }
            }
        };

        TrackReport {
            outcome,
            searches: search.searches,
            rate_limited: search.rate_limited,
        }
    }

    /// One call site per attempt; rate-limited attempts rotate identity and
    /// back off before the next one
    async fn search_with_retries(&self, query: &str) -> SearchReport {
        let mut report = SearchReport {
            result: Ok(Vec::new()),
            searches: 0,
            rate_limited: 0,
        };

        for attempt in 1..=self.config.max_retries {
            let generation = self.identity.generation();
            report.searches += 1;

            match self.search.search(query).await {
                Ok(candidates) => {
                    debug!("'{}': {} candidates", query, candidates.len());
                    report.result = Ok(candidates);
                    return report;
                }
                Err(e) if e.is_rate_limited() => {
                    report.rate_limited += 1;
                    warn!(
                        "Rate limited searching '{}' (attempt {}/{}): {}",
                        query, attempt, self.config.max_retries, e
                    );
                    report.result = Err(e);

                    if attempt < self.config.max_retries {
                        if self.identity.rotate_if_stale(generation).await == RotationOutcome::Failed {
                            debug!("Retrying '{}' without a new identity", query);
                        }
                        tokio::time::sleep(self.config.rate_limit_backoff).await;
                    }
                }
                Err(e) => {
                    report.result = Err(e);
                    return report;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
