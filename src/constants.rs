//! Application constants for Playlist Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Password for the Tor control port (optional, cookie/none auth otherwise)
    pub const TOR_PASSWORD: &str = "PLAYLIST_FETCHER_TOR_PASSWORD";

    /// Overrides the configuration file location
    pub const CONFIG_FILE: &str = "PLAYLIST_FETCHER_CONFIG";
}

/// Candidate selection heuristics
///
/// These lists are reproduced literally; changing them changes which video
/// gets picked for a track.
pub mod selector {
    /// Title fragments that disqualify a candidate
    pub const DENYLIST: &[&str] = &["live", "lyric", "cover", "remix", "nightcore", "sped up"];

    /// Title fragments that make a candidate look official
    pub const OFFICIAL_TITLE_KEYWORDS: &[&str] = &["official", "audio", "video"];

    /// Uploader fragments that make a candidate look official
    pub const OFFICIAL_UPLOADER_KEYWORDS: &[&str] = &["vevo", "topic"];

    /// Maximum distance in seconds between candidate and expected duration
    pub const DURATION_TOLERANCE_SECS: f64 = 3.0;
}

/// Rate limiting and retry configuration
pub mod limits {
    use super::Duration;

    /// Total attempts for a search or a download task when rate limited
    pub const MAX_RETRIES: u32 = 3;

    /// Fixed wait after a rate-limit response before trying again
    pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

    /// Base delay for transient download retries (exponential)
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Upper bound for transient download retry delay
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Jitter factor for randomizing retry delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

    /// Default pacing for search requests (requests per second)
    pub const DEFAULT_SEARCH_RPS: u32 = 2;
}

/// Network identity rotation
pub mod identity {
    use super::Duration;

    /// Default Tor control endpoint
    pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:9051";

    /// Minimum spacing between two real rotations
    pub const MIN_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

    /// Timeout for the whole control-port conversation
    pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Search provider settings
pub mod search {
    /// Default yt-dlp executable name
    pub const YT_DLP_PROGRAM: &str = "yt-dlp";

    /// Default ffmpeg executable name
    pub const FFMPEG_PROGRAM: &str = "ffmpeg";

    /// Number of results requested per query
    pub const RESULTS_PER_QUERY: u32 = 10;

    /// Watch URL prefix used when recording a resolved link
    pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

    /// Target sample rate for transcoded audio
    pub const TARGET_SAMPLE_RATE: u32 = 44_100;

    /// Target channel count for transcoded audio
    pub const TARGET_CHANNELS: u32 = 2;

    /// Target MP3 bitrate
    pub const TARGET_BITRATE: &str = "192k";
}

/// Ledger file format
pub mod ledger {
    /// Literal token stored in the link column for unresolved tracks
    pub const NOT_FOUND: &str = "NOT FOUND";

    /// Column headers, in file order
    pub const HEADERS: [&str; 6] = [
        "Artist",
        "Title",
        "YouTube Link",
        "Video Title",
        "Uploader",
        "Duration (s)",
    ];

    /// Name of the merged multi-catalog ledger
    pub const COMBINED_CATALOG: &str = "combined";

    /// Request buffer for each per-catalog writer task
    pub const WRITER_QUEUE_CAPACITY: usize = 64;

    /// Extension of the scratch file used while rewriting a ledger
    pub const TEMP_EXTENSION: &str = "csv.tmp";
}

/// Default directory layout
pub mod paths {
    /// Input catalogs (playlist exports)
    pub const CATALOGS_DIR: &str = "catalogs";

    /// Resolution ledgers
    pub const EXPORTS_DIR: &str = "exports";

    /// Downloaded audio
    pub const DOWNLOADS_DIR: &str = "downloads";

    /// Run logs
    pub const LOGS_DIR: &str = "logs";

    /// Scratch directory for raw media inside a catalog download directory
    pub const PARTIAL_DIR: &str = ".partial";

    /// Extension of catalog and ledger files
    pub const CSV_EXTENSION: &str = "csv";

    /// Extension of finished audio files
    pub const AUDIO_EXTENSION: &str = "mp3";

    /// Longest file stem written to disk, leaving room for suffixes under
    /// the usual 255-byte name limit
    pub const MAX_FILE_STEM_BYTES: usize = 200;

    /// Extension of run logs
    pub const LOG_EXTENSION: &str = "log";
}

/// Progress display templates
pub mod progress {
    /// Overall bar for the resolve and download stages
    pub const MAIN_BAR_TEMPLATE: &str =
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

    /// Per-worker status line
    pub const WORKER_TEMPLATE: &str = "  Worker {prefix}: {spinner:.blue} {msg}";

    pub const PROGRESS_CHARS: &str = "##-";
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of download workers
    pub const DEFAULT_WORKER_COUNT: usize = 5;

    /// Maximum recommended concurrent workers
    pub const MAX_WORKER_COUNT: usize = 32;

    /// Bounded buffer between workers and the progress aggregator
    pub const OUTCOME_BUFFER_SIZE: usize = 64;

    /// Default number of concurrent resolutions
    pub const DEFAULT_RESOLVER_CONCURRENCY: usize = 1;
}

/// Catalog input columns
pub mod catalog {
    /// Artist column (may hold several comma-separated names)
    pub const ARTIST_COLUMN: &str = "Artist Name(s)";

    /// Track title column
    pub const TRACK_COLUMN: &str = "Track Name";

    /// Duration column in milliseconds
    pub const DURATION_COLUMN: &str = "Duration (ms)";

    /// Artist used when nothing can be inferred
    pub const UNKNOWN_ARTIST: &str = "Unknown";
}

// Re-export commonly used constants for convenience
pub use ledger::NOT_FOUND;
pub use limits::{MAX_RETRIES, RATE_LIMIT_BACKOFF};
pub use selector::DURATION_TOLERANCE_SECS;
pub use workers::DEFAULT_WORKER_COUNT;
