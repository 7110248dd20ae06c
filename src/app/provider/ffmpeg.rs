//! ffmpeg transcoding to MP3

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ytdlp::failure;
use super::Transcoder;
use crate::constants::search::{FFMPEG_PROGRAM, TARGET_BITRATE, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::errors::{ProviderError, ProviderResult};

/// Transcoder running the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn arguments(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-ar".into(),
            TARGET_SAMPLE_RATE.to_string().into(),
            "-ac".into(),
            TARGET_CHANNELS.to_string().into(),
            "-b:a".into(),
            TARGET_BITRATE.into(),
            output.into(),
        ]
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new(FFMPEG_PROGRAM)
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn transcode(&self, input: &Path, output: &Path) -> ProviderResult<()> {
        debug!("Transcoding {} -> {}", input.display(), output.display());

        let result = Command::new(&self.program)
            .args(Self::arguments(input, output))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProviderError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if result.status.success() {
            Ok(())
        } else {
            Err(failure(&result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_target_format() {
        let args = Ffmpeg::arguments(Path::new("in.webm"), Path::new("out.mp3"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args.join(" "),
            "-y -loglevel error -i in.webm -vn -ar 44100 -ac 2 -b:a 192k out.mp3"
        );
    }
}
