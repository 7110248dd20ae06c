//! External capabilities
//!
//! The pipeline talks to the outside world only through the traits in this
//! module: searching for candidates, fetching raw media, transcoding,
//! tagging and probing durations. Production implementations wrap `yt-dlp`,
//! `ffmpeg` and `lofty`; tests substitute in-memory fakes.
//!
//! Provider failures carry their rate-limit classification in
//! [`ProviderError`]; see [`crate::errors::classify_message`].

pub mod ffmpeg;
pub mod tags;
pub mod ytdlp;

pub use ffmpeg::Ffmpeg;
pub use tags::LoftyTags;
pub use ytdlp::YtDlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::models::Candidate;
use crate::errors::{DownloadResult, ProviderResult};

/// Search for candidate videos
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Candidates for `query`, in provider relevance order
    async fn search(&self, query: &str) -> ProviderResult<Vec<Candidate>>;
}

/// Fetch raw media for a video link
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `link` into `dest_dir`, returning the path of the raw file
    async fn fetch(&self, link: &str, dest_dir: &Path) -> ProviderResult<PathBuf>;
}

/// Transcode raw media to the target audio format
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write `output` from `input`; `output` is overwritten
    async fn transcode(&self, input: &Path, output: &Path) -> ProviderResult<()>;
}

/// Tags written to a finished audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// Write tags to an audio file
#[async_trait]
pub trait AudioTagger: Send + Sync {
    async fn tag(&self, path: &Path, tags: &TrackTags) -> DownloadResult<()>;
}

/// Measure the playing time of an audio file
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds
    async fn probe(&self, path: &Path) -> DownloadResult<f64>;
}

/// The capabilities a download worker needs, bundled for sharing
#[derive(Clone)]
pub struct MediaTools {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub tagger: Arc<dyn AudioTagger>,
    pub probe: Arc<dyn DurationProbe>,
}

impl MediaTools {
    /// Bundle the given capabilities
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        tagger: Arc<dyn AudioTagger>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            tagger,
            probe,
        }
    }
}

impl std::fmt::Debug for MediaTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTools").finish_non_exhaustive()
    }
}
