//! yt-dlp search and download
//!
//! Runs the `yt-dlp` executable as a subprocess. Searches use
//! `ytsearchN:<query>` with `--dump-json --flat-playlist`, which prints one
//! JSON object per result without resolving formats. Throttling is only
//! visible in the tool's stderr, so failures are classified from that text.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{MediaFetcher, SearchProvider};
use crate::app::models::Candidate;
use crate::constants::search::{RESULTS_PER_QUERY, YT_DLP_PROGRAM};
use crate::errors::{ProviderError, ProviderResult};

type SearchLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
}

/// Search provider and media fetcher backed by yt-dlp
#[derive(Clone)]
pub struct YtDlp {
    program: PathBuf,
    results_per_query: u32,
    proxy: Option<String>,
    limiter: Option<Arc<SearchLimiter>>,
}

impl YtDlp {
    /// Use the given executable with default settings and no pacing
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            results_per_query: RESULTS_PER_QUERY,
            proxy: None,
            limiter: None,
        }
    }

    /// Number of results requested per search
    pub fn with_results_per_query(mut self, results: u32) -> Self {
        self.results_per_query = results.max(1);
        self
    }

    /// Route all requests through `proxy`
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    /// Pace searches to at most `requests_per_second`; zero disables pacing
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--no-warnings")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        command
    }

    async fn run(&self, mut command: Command) -> ProviderResult<Output> {
        let output = command.output().await.map_err(|source| ProviderError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(failure(&output))
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(YT_DLP_PROGRAM)
    }
}

impl std::fmt::Debug for YtDlp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlp")
            .field("program", &self.program)
            .field("results_per_query", &self.results_per_query)
            .field("proxy", &self.proxy)
            .field("paced", &self.limiter.is_some())
            .finish()
    }
}

#[async_trait]
impl SearchProvider for YtDlp {
    async fn search(&self, query: &str) -> ProviderResult<Vec<Candidate>> {
        if let Some(limiter) = &self.limiter {
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }

        debug!("Searching: {}", query);
        let mut command = self.command();
        command
            .arg("--dump-json")
            .arg("--flat-playlist")
            .arg(format!("ytsearch{}:{}", self.results_per_query, query));

        let output = self.run(command).await?;
        parse_search_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(&self, link: &str, dest_dir: &Path) -> ProviderResult<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;

        debug!("Fetching {} into {}", link, dest_dir.display());
        let mut command = self.command();
        command
            .arg("-f")
            .arg("bestaudio/best")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-simulate")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(dest_dir.join("%(id)s.%(ext)s"))
            .arg(link);

        let output = self.run(command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ProviderError::Parse {
                reason: format!("yt-dlp did not report a file for {}", link),
            })?;

        if !path.exists() {
            return Err(ProviderError::Parse {
                reason: format!("yt-dlp reported missing file {}", path.display()),
            });
        }
        Ok(path)
    }
}

/// Turn a failed run into a classified error
pub(crate) fn failure(output: &Output) -> ProviderError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    if message.is_empty() {
        ProviderError::from_message(format!("exited with {}", output.status))
    } else {
        ProviderError::from_message(message)
    }
}

/// Parse `--dump-json` output, one JSON object per line
pub fn parse_search_output(stdout: &str) -> ProviderResult<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let entry: SearchEntry = serde_json::from_str(line).map_err(|e| ProviderError::Parse {
            reason: format!("invalid search result: {}", e),
        })?;

        let Some(id) = entry.id.filter(|id| !id.is_empty()) else {
            continue;
        };
        let uploader = entry.uploader.or(entry.channel).unwrap_or_default();
        candidates.push(Candidate::new(
            id,
            entry.title.unwrap_or_default(),
            uploader,
            entry.duration,
        ));
    }
    Ok(candidates)
}
