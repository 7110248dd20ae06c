//! Tag writing and duration probing with lofty

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::Tag;

use super::{AudioTagger, DurationProbe, TrackTags};
use crate::errors::{DownloadError, DownloadResult};

/// Tagger and probe for local audio files
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTags;

impl LoftyTags {
    pub fn new() -> Self {
        Self
    }
}

fn write_tags(path: &Path, tags: &TrackTags) -> Result<(), String> {
    let mut tagged_file = read_from_path(path).map_err(|e| format!("failed to read file: {e}"))?;
    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }

    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| format!("no writable tag available for {:?}", tag_type))?;
    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|e| format!("failed to write tags: {e}"))
}

fn read_duration(path: &Path) -> Result<f64, String> {
    let tagged_file = read_from_path(path).map_err(|e| format!("failed to read file: {e}"))?;
    Ok(tagged_file.properties().duration().as_secs_f64())
}

async fn blocking<T, F>(path: &Path, work: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> Result<T, String> + Send + 'static,
{
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || work(owned))
        .await
        .map_err(|e| format!("tag task failed: {e}"))?
}

#[async_trait]
impl AudioTagger for LoftyTags {
    async fn tag(&self, path: &Path, tags: &TrackTags) -> DownloadResult<()> {
        let tags = tags.clone();
        blocking(path, move |p| write_tags(&p, &tags))
            .await
            .map_err(|reason| DownloadError::Tagging {
                path: path.to_path_buf(),
                reason,
            })
    }
}

#[async_trait]
impl DurationProbe for LoftyTags {
    async fn probe(&self, path: &Path) -> DownloadResult<f64> {
        blocking(path, |p| read_duration(&p))
            .await
            .map_err(|reason| DownloadError::Probe {
                path: path.to_path_buf(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_rejects_non_audio() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.bin");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = LoftyTags::new().probe(&path).await;
        assert!(matches!(result, Err(DownloadError::Probe { .. })));
    }

    #[tokio::test]
    async fn test_tag_missing_file() {
        let tags = TrackTags {
            title: "t".into(),
            artist: "a".into(),
            album: "c".into(),
        };
        let result = LoftyTags::new().tag(Path::new("/nonexistent/x.mp3"), &tags).await;
        assert!(matches!(result, Err(DownloadError::Tagging { .. })));
    }
}
