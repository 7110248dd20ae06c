//! Data models for Playlist Fetcher
//!
//! This module defines the core data structures that flow through the
//! pipeline: catalog tracks, search candidates, ledger rows and download
//! tasks, plus the key normalization that ties them together.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{ledger, paths, search};

/// Normalize a key component: trim surrounding whitespace and casefold
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Identity of a track inside a catalog
///
/// Two tracks with the same normalized artist and title are the same track,
/// whatever their original spelling or padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    artist: String,
    title: String,
}

impl TrackKey {
    /// Build a key from raw artist and title strings
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: normalize(artist),
            title: normalize(title),
        }
    }

    /// Normalized artist
    pub fn artist(&self) -> &str {
        &self.artist
    }

    /// Normalized title
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// A track from an input catalog
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    /// Primary artist
    pub artist: String,
    /// Track title
    pub title: String,
    /// Expected length in seconds, if the catalog knows it
    pub expected_duration_seconds: Option<f64>,
    /// Name of the catalog this track came from
    pub source_catalog: String,
}

impl TrackRecord {
    /// Create a new track record
    pub fn new(
        artist: impl Into<String>,
        title: impl Into<String>,
        expected_duration_seconds: Option<f64>,
        source_catalog: impl Into<String>,
    ) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            expected_duration_seconds,
            source_catalog: source_catalog.into(),
        }
    }

    /// Normalized identity key
    pub fn key(&self) -> TrackKey {
        TrackKey::new(&self.artist, &self.title)
    }

    /// Search query for this track
    pub fn query(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// A search result considered as a possible match
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Provider video id
    pub id: String,
    /// Video title
    pub title: String,
    /// Channel or uploader name
    pub uploader: String,
    /// Length in seconds, when the provider reports it
    pub duration_seconds: Option<f64>,
}

impl Candidate {
    /// Create a new candidate
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        uploader: impl Into<String>,
        duration_seconds: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            uploader: uploader.into(),
            duration_seconds,
        }
    }

    /// Watch URL for this candidate
    pub fn watch_url(&self) -> String {
        format!("{}{}", search::WATCH_URL_PREFIX, self.id)
    }
}

/// Link column of a ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VideoLink {
    /// A well-formed video URL
    Found(String),
    /// The track could not be matched
    NotFound,
}

impl VideoLink {
    /// True for the `NOT FOUND` token
    pub fn is_not_found(&self) -> bool {
        matches!(self, VideoLink::NotFound)
    }

    /// URL of a found link
    pub fn url(&self) -> Option<&str> {
        match self {
            VideoLink::Found(url) => Some(url),
            VideoLink::NotFound => None,
        }
    }
}

impl TryFrom<String> for VideoLink {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == ledger::NOT_FOUND {
            return Ok(VideoLink::NotFound);
        }
        url::Url::parse(trimmed)
            .map(|_| VideoLink::Found(trimmed.to_string()))
            .map_err(|e| format!("invalid video link '{}': {}", trimmed, e))
    }
}

impl From<VideoLink> for String {
    fn from(link: VideoLink) -> Self {
        match link {
            VideoLink::Found(url) => url,
            VideoLink::NotFound => ledger::NOT_FOUND.to_string(),
        }
    }
}

/// One ledger row: the outcome of resolving a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "YouTube Link")]
    pub link: VideoLink,
    #[serde(rename = "Video Title")]
    pub matched_title: String,
    #[serde(rename = "Uploader")]
    pub uploader: String,
    #[serde(rename = "Duration (s)", deserialize_with = "csv::invalid_option")]
    pub matched_duration_seconds: Option<f64>,
}

impl ResolutionRecord {
    /// Record a successful match
    pub fn found(track: &TrackRecord, candidate: &Candidate) -> Self {
        Self {
            artist: track.artist.clone(),
            title: track.title.clone(),
            link: VideoLink::Found(candidate.watch_url()),
            matched_title: candidate.title.clone(),
            uploader: candidate.uploader.clone(),
            matched_duration_seconds: candidate.duration_seconds,
        }
    }

    /// Record a terminal "not found" outcome with empty metadata
    pub fn not_found(track: &TrackRecord) -> Self {
        Self {
            artist: track.artist.clone(),
            title: track.title.clone(),
            link: VideoLink::NotFound,
            matched_title: String::new(),
            uploader: String::new(),
            matched_duration_seconds: None,
        }
    }

    /// Normalized identity key
    pub fn key(&self) -> TrackKey {
        TrackKey::new(&self.artist, &self.title)
    }

    /// True if this row is a `NOT FOUND` outcome
    pub fn is_not_found(&self) -> bool {
        self.link.is_not_found()
    }
}

/// One unit of download work derived from a resolved ledger row
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub artist: String,
    pub title: String,
    /// Video URL to fetch
    pub link: String,
    /// Title of the matched video, used for the file name
    pub matched_title: String,
    /// Duration used to validate an existing file
    pub expected_duration_seconds: Option<f64>,
    /// Directory the finished file goes into
    pub output_directory: PathBuf,
    /// Catalog name, written as the album tag
    pub catalog: String,
}

impl DownloadTask {
    /// Derive a task from a ledger row; `None` for `NOT FOUND` rows
    pub fn from_record(record: &ResolutionRecord, catalog: &str, downloads_root: &Path) -> Option<Self> {
        let link = record.link.url()?;
        Some(Self {
            artist: record.artist.clone(),
            title: record.title.clone(),
            link: link.to_string(),
            matched_title: record.matched_title.clone(),
            expected_duration_seconds: record.matched_duration_seconds,
            output_directory: downloads_root.join(catalog),
            catalog: catalog.to_string(),
        })
    }

    /// Identity used by the queue to reject duplicate tasks
    pub fn task_id(&self) -> String {
        format!("{}/{}", self.catalog, TrackKey::new(&self.artist, &self.title))
    }

    /// File name stem for the finished audio file
    pub fn file_stem(&self) -> String {
        let base = if self.matched_title.trim().is_empty() {
            &self.title
        } else {
            &self.matched_title
        };
        truncate_file_name(&sanitize_file_name(base), paths::MAX_FILE_STEM_BYTES)
    }

    /// Final path of the transcoded file
    pub fn target_path(&self) -> PathBuf {
        self.output_directory
            .join(format!("{}.{}", self.file_stem(), paths::AUDIO_EXTENSION))
    }

    /// Scratch root for raw media of the catalog
    pub fn partial_directory(&self) -> PathBuf {
        self.output_directory.join(paths::PARTIAL_DIR)
    }

    /// Scratch directory owned by this task alone
    ///
    /// Named after the task id, which the queue keeps unique, so tasks that
    /// share a link or a matched title never touch each other's files.
    pub fn scratch_directory(&self) -> PathBuf {
        let name = truncate_file_name(&sanitize_file_name(&self.task_id()), paths::MAX_FILE_STEM_BYTES);
        self.partial_directory().join(name)
    }

    /// Short label for logs and progress lines
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// Make a string safe to use as a single file name component
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Cut `name` to at most `max_bytes` bytes without splitting a character
pub fn truncate_file_name(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end().to_string()
}
