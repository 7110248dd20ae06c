//! Catalog ingestion
//!
//! Reads playlist exports (one CSV file per catalog) into [`TrackRecord`]s.
//! Only three columns matter: `Artist Name(s)`, `Track Name` and
//! `Duration (ms)`; everything else in the export is ignored.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::app::models::{TrackKey, TrackRecord};
use crate::constants::{catalog as columns, paths};
use crate::errors::{CatalogError, CatalogResult};

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Artist Name(s)", default)]
    artist_names: Option<String>,
    #[serde(rename = "Track Name", default)]
    track_name: Option<String>,
    #[serde(
        rename = "Duration (ms)",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    duration_ms: Option<f64>,
}

/// An input collection of tracks from one playlist export
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    /// Catalog name (file stem of the export)
    pub name: String,
    /// Unique tracks in export order
    pub tracks: Vec<TrackRecord>,
}

impl Catalog {
    /// Build a catalog, dropping later duplicates of the same key
    pub fn new(name: impl Into<String>, tracks: Vec<TrackRecord>) -> Self {
        let mut seen = HashSet::new();
        let tracks = tracks
            .into_iter()
            .filter(|track| seen.insert(track.key()))
            .collect();
        Self {
            name: name.into(),
            tracks,
        }
    }

    /// Merge several catalogs into one, each track keeping its source
    pub fn combine(name: impl Into<String>, catalogs: &[Catalog]) -> Self {
        let tracks = catalogs
            .iter()
            .flat_map(|catalog| catalog.tracks.iter().cloned())
            .collect();
        Self::new(name, tracks)
    }

    /// Drop every track whose key is in `keys`
    pub fn without_keys(mut self, keys: &HashSet<TrackKey>) -> Self {
        self.tracks.retain(|track| !keys.contains(&track.key()));
        self
    }

    /// Number of unique tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if the catalog holds no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Catalog name for an export path (the file stem)
pub fn catalog_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List catalog exports in `dir`, sorted by name
///
/// Files starting with `_` are scratch artefacts and are skipped.
pub fn discover_catalogs(dir: &Path) -> CatalogResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CatalogError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();

        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(paths::CSV_EXTENSION));
        let is_scratch = catalog_name(&path).starts_with('_');
        if path.is_file() && is_csv && !is_scratch {
            found.push(path);
        }
    }

    found.sort();
    debug!("Discovered {} catalogs in {}", found.len(), dir.display());
    Ok(found)
}

/// Load one catalog export
pub fn load_catalog(path: &Path) -> CatalogResult<Catalog> {
    let file = fs::File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_catalog(catalog_name(path), file)
}

/// Load a catalog by name from the catalogs directory
pub fn load_named_catalog(dir: &Path, name: &str) -> CatalogResult<Catalog> {
    let path = dir.join(format!("{}.{}", name, paths::CSV_EXTENSION));
    if !path.is_file() {
        return Err(CatalogError::UnknownCatalog {
            name: name.to_string(),
        });
    }
    load_catalog(&path)
}

/// Parse catalog rows from any reader
pub fn read_catalog<R: std::io::Read>(name: String, reader: R) -> CatalogResult<Catalog> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let mut tracks = Vec::new();
    let mut skipped = 0usize;
    let mut unreadable = 0usize;
    for (index, row) in csv_reader.deserialize::<CatalogRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                // +2: header row and 1-based numbering
                warn!("Catalog '{}': skipping unreadable row {}: {}", name, index + 2, e);
                unreadable += 1;
                continue;
            }
        };
        let Some(title) = row.track_name.as_deref().map(str::trim).filter(|t| !t.is_empty())
        else {
            skipped += 1;
            continue;
        };

        let artist = infer_artist(row.artist_names.as_deref(), title);
        let expected = row.duration_ms.filter(|ms| *ms > 0.0).map(|ms| ms / 1000.0);
        tracks.push(TrackRecord::new(artist, title, expected, name.clone()));
    }

    if skipped > 0 {
        debug!("Catalog '{}': skipped {} rows without a track name", name, skipped);
    }
    if unreadable > 0 {
        warn!("Catalog '{}': skipped {} unreadable rows", name, unreadable);
    }

    let catalog = Catalog::new(name, tracks);
    info!("Loaded catalog '{}' with {} tracks", catalog.name, catalog.len());
    Ok(catalog)
}

/// Pick the primary artist of a row
///
/// First comma-separated name of the artist column; failing that the part of
/// the track name before a `-`; failing that `Unknown`.
pub fn infer_artist(artist_names: Option<&str>, track_name: &str) -> String {
    if let Some(names) = artist_names.filter(|n| !n.trim().is_empty()) {
        let first = names.split(',').next().unwrap_or(names).trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some((artist, _)) = track_name.split_once('-') {
        let artist = artist.trim();
        if !artist.is_empty() {
            return artist.to_string();
        }
    }

    columns::UNKNOWN_ARTIST.to_string()
}
