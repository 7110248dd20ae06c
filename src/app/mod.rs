//! Core application logic for Playlist Fetcher
//!
//! The pipeline has two stages. The resolve stage reads catalogs, searches
//! for each track and records the chosen video (or `NOT FOUND`) in a
//! per-catalog ledger. The download stage turns ledger rows into tasks and
//! runs a worker pool that fetches, transcodes and tags them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playlist_fetcher::app::{load_catalog, IdentityGuard, Ledger, Resolver, ResolverConfig, YtDlp};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = load_catalog("catalogs/road-trip.csv".as_ref())?;
//! let ledger = Arc::new(Ledger::open("exports").await?);
//!
//! let resolver = Resolver::new(
//!     ledger.clone(),
//!     Arc::new(YtDlp::new("yt-dlp")),
//!     Arc::new(IdentityGuard::disabled()),
//!     ResolverConfig::default(),
//! )?;
//! let summary = resolver.resolve_catalog(&catalog).await?;
//! println!("{} resolved, {} not found", summary.resolved, summary.not_found);
//!
//! ledger.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod coordinator;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod provider;
pub mod queue;
pub mod resolver;
pub mod selector;
pub mod worker;

// Re-export main public API
pub use catalog::{discover_catalogs, load_catalog, load_named_catalog, Catalog};
pub use coordinator::{Coordinator, CoordinatorConfig, ProgressObserver, ProgressSnapshot, SessionResult};
pub use identity::{IdentityGuard, IdentityRotator, TorControl};
pub use ledger::{AppendOutcome, Ledger};
pub use models::{normalize, Candidate, DownloadTask, ResolutionRecord, TrackKey, TrackRecord, VideoLink};
pub use provider::{Ffmpeg, LoftyTags, MediaTools, YtDlp};
pub use queue::TaskQueue;
pub use resolver::{ResolveObserver, ResolveSummary, Resolver, ResolverConfig, TrackOutcome};
pub use selector::select_best;
pub use worker::{OutcomeStatus, TaskOutcome, WorkerConfig, WorkerPool};
