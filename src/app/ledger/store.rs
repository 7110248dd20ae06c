//! Ledger file format
//!
//! One UTF-8 CSV file per catalog: a header row followed by one row per
//! [`ResolutionRecord`], newline terminated. Only the writer task in
//! [`super::writer`] ever modifies these files; this module holds the pure
//! encode/decode helpers and the blocking rewrite used for explicit
//! re-resolution.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::app::models::{ResolutionRecord, TrackKey};
use crate::constants::{ledger, paths};
use crate::errors::{LedgerError, LedgerResult};

/// Contents of a ledger file after de-duplication
#[derive(Debug, Clone, Default)]
pub struct LoadedLedger {
    /// Unique records in file order (first row per key wins)
    pub records: Vec<ResolutionRecord>,
    /// Rows dropped because their key was already present
    pub duplicates: usize,
    /// Rows that could not be decoded
    pub invalid: usize,
}

impl LoadedLedger {
    /// Keys of all unique records
    pub fn keys(&self) -> HashSet<TrackKey> {
        self.records.iter().map(ResolutionRecord::key).collect()
    }
}

/// Path of the ledger file for `catalog` inside `dir`
pub fn ledger_path(dir: &Path, catalog: &str) -> PathBuf {
    dir.join(format!("{}.{}", catalog, paths::CSV_EXTENSION))
}

/// Encode the header row
pub fn encode_header() -> LedgerResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(ledger::HEADERS)?;
    finish(writer)
}

/// Encode a single data row, newline terminated
pub fn encode_record(record: &ResolutionRecord) -> LedgerResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> LedgerResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| LedgerError::Csv(csv::Error::from(e.into_error())))
}

/// Decode ledger bytes
///
/// An empty input is an empty ledger. Undecodable rows (for example a row
/// cut short by a crash) are skipped and counted rather than failing the
/// whole file.
pub fn decode(path: &Path, bytes: &[u8]) -> LedgerResult<LoadedLedger> {
    let mut loaded = LoadedLedger::default();
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(loaded);
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers = reader.headers()?.clone();
    let found: Vec<&str> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    if found != ledger::HEADERS {
        return Err(LedgerError::InvalidHeader {
            path: path.to_path_buf(),
            found: found.join(","),
        });
    }

    let mut seen = HashSet::new();
    for (index, row) in reader.deserialize::<ResolutionRecord>().enumerate() {
        match row {
            Ok(record) => {
                if seen.insert(record.key()) {
                    loaded.records.push(record);
                } else {
                    loaded.duplicates += 1;
                }
            }
            Err(e) => {
                // +2: one for the header, one for 1-based numbering
                warn!("Skipping unreadable row {} in {}: {}", index + 2, path.display(), e);
                loaded.invalid += 1;
            }
        }
    }

    Ok(loaded)
}

/// Read and decode a ledger file; a missing file is an empty ledger
pub async fn load(path: &Path) -> LedgerResult<LoadedLedger> {
    match tokio::fs::read(path).await {
        Ok(bytes) => decode(path, &bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LoadedLedger::default()),
        Err(source) => Err(LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Rewrite a ledger without its `NOT FOUND` rows
///
/// Writes a temporary sibling file, syncs it and renames it over the
/// original so a crash leaves either the old or the new file. Returns the
/// keys that were removed.
pub fn rewrite_without_not_found(path: &Path) -> LedgerResult<Vec<TrackKey>> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };
    let loaded = decode(path, &bytes)?;

    let (removed, kept): (Vec<_>, Vec<_>) = loaded
        .records
        .into_iter()
        .partition(ResolutionRecord::is_not_found);
    if removed.is_empty() {
        return Ok(Vec::new());
    }

    let mut content = encode_header()?;
    for record in &kept {
        content.extend(encode_record(record)?);
    }

    let temp_path = path.with_extension(ledger::TEMP_EXTENSION);
    {
        let mut file = fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(&content).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&temp_path, path).map_err(io_err)?;

    Ok(removed.iter().map(ResolutionRecord::key).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Candidate, TrackRecord};
    use tempfile::TempDir;

    fn found(artist: &str, title: &str) -> ResolutionRecord {
        let track = TrackRecord::new(artist, title, Some(200.0), "c");
        ResolutionRecord::found(&track, &Candidate::new("id1", "Video, \"quoted\"", "Uploader", Some(201.0)))
    }

    fn missing(artist: &str, title: &str) -> ResolutionRecord {
        ResolutionRecord::not_found(&TrackRecord::new(artist, title, None, "c"))
    }

    fn file_bytes(records: &[ResolutionRecord]) -> Vec<u8> {
        let mut bytes = encode_header().unwrap();
        for record in records {
            bytes.extend(encode_record(record).unwrap());
        }
        bytes
    }

    #[test]
    fn test_header_layout() {
        let header = String::from_utf8(encode_header().unwrap()).unwrap();
        assert_eq!(
            header,
            "Artist,Title,YouTube Link,Video Title,Uploader,Duration (s)\n"
        );
    }

    #[test]
    fn test_not_found_row_has_empty_metadata() {
        let row = String::from_utf8(encode_record(&missing("A", "B")).unwrap()).unwrap();
        assert_eq!(row, "A,B,NOT FOUND,,,\n");
    }

    #[test]
    fn test_decode_keeps_first_row_per_key() {
        let bytes = file_bytes(&[found("A", "One"), missing(" a ", "ONE"), missing("B", "Two")]);
        let loaded = decode(Path::new("x.csv"), &bytes).unwrap();

        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.duplicates, 1);
        assert!(!loaded.records[0].is_not_found());
        assert_eq!(loaded.records[0].matched_title, "Video, \"quoted\"");
        assert_eq!(loaded.records[0].matched_duration_seconds, Some(201.0));
    }

    #[test]
    fn test_decode_skips_truncated_row() {
        let mut bytes = file_bytes(&[found("A", "One")]);
        bytes.extend_from_slice(b"B,Two,https://www.you");
        let loaded = decode(Path::new("x.csv"), &bytes).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.invalid, 1);
    }

    #[test]
    fn test_decode_rejects_foreign_header() {
        let result = decode(Path::new("x.csv"), b"a,b,c\n1,2,3\n");
        assert!(matches!(result, Err(LedgerError::InvalidHeader { .. })));
    }

    #[test]
    fn test_decode_accepts_empty_file() {
        let loaded = decode(Path::new("x.csv"), b"").unwrap();
        assert!(loaded.records.is_empty());
    }

    #[test]
    fn test_rewrite_without_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = ledger_path(temp_dir.path(), "c");
        fs::write(&path, file_bytes(&[found("A", "One"), missing("B", "Two")])).unwrap();

        let removed = rewrite_without_not_found(&path).unwrap();
        assert_eq!(removed, vec![TrackKey::new("b", "two")]);

        let loaded = decode(&path, &fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(!path.with_extension(ledger::TEMP_EXTENSION).exists());

        // Nothing left to remove: file untouched
        assert!(rewrite_without_not_found(&path).unwrap().is_empty());
    }
}
