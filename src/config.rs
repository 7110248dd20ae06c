//! Configuration management for Playlist Fetcher
//!
//! This module provides TOML configuration with zero-config defaults. Every
//! section and field is optional; durations use humantime notation
//! (`"5s"`, `"1m 30s"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::coordinator::CoordinatorConfig;
use crate::app::resolver::ResolverConfig;
use crate::app::worker::WorkerConfig;
use crate::constants::{env, identity, limits, paths, search, selector, workers};
use crate::errors::ConfigError;

/// Name of the project-local configuration file
pub const LOCAL_CONFIG_FILE: &str = "playlist-fetcher.toml";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory layout
    pub paths: PathsConfig,
    /// Search and download tool settings
    pub search: SearchConfig,
    /// Network identity rotation
    pub identity: IdentityConfig,
    /// Resolve stage
    pub resolver: ResolverSection,
    /// Download stage
    pub download: DownloadSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Input catalogs
    pub catalogs_dir: PathBuf,
    /// Resolution ledgers
    pub exports_dir: PathBuf,
    /// Downloaded audio
    pub downloads_dir: PathBuf,
    /// Run logs
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalogs_dir: PathBuf::from(paths::CATALOGS_DIR),
            exports_dir: PathBuf::from(paths::EXPORTS_DIR),
            downloads_dir: PathBuf::from(paths::DOWNLOADS_DIR),
            logs_dir: PathBuf::from(paths::LOGS_DIR),
        }
    }
}

/// Search and download tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// yt-dlp executable
    pub yt_dlp_path: PathBuf,
    /// Candidates requested per query
    pub results_per_query: u32,
    /// Search pacing
    pub requests_per_second: u32,
    /// Proxy URL handed to yt-dlp, e.g. `socks5://127.0.0.1:9050`
    pub proxy: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::from(search::YT_DLP_PROGRAM),
            results_per_query: search::RESULTS_PER_QUERY,
            requests_per_second: limits::DEFAULT_SEARCH_RPS,
            proxy: None,
        }
    }
}

/// Network identity rotation
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Rotate identity when rate limited
    pub enabled: bool,
    /// Tor control endpoint
    pub control_addr: String,
    /// Control port password; usually taken from the environment
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Minimum spacing between rotations
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            control_addr: identity::DEFAULT_CONTROL_ADDR.to_string(),
            password: None,
            min_interval: identity::MIN_ROTATION_INTERVAL,
        }
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("enabled", &self.enabled)
            .field("control_addr", &self.control_addr)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

/// Resolve stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// Total search attempts per track
    pub max_retries: u32,
    /// Wait after a rate-limited search
    #[serde(with = "humantime_serde")]
    pub rate_limit_backoff: Duration,
    /// Tracks resolved at the same time
    pub concurrency: usize,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            max_retries: limits::MAX_RETRIES,
            rate_limit_backoff: limits::RATE_LIMIT_BACKOFF,
            concurrency: workers::DEFAULT_RESOLVER_CONCURRENCY,
        }
    }
}

/// Download stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    /// Concurrent download workers
    pub worker_count: usize,
    /// Total attempts per task
    pub max_retries: u32,
    /// Wait after a rate-limited download
    #[serde(with = "humantime_serde")]
    pub rate_limit_backoff: Duration,
    /// Also retry failures that are not rate limits
    pub retry_transient: bool,
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,
    /// Bounded outcome buffer between workers and the progress display
    pub outcome_buffer: usize,
    /// Accepted duration difference for an existing file
    #[serde(with = "humantime_serde")]
    pub duration_tolerance: Duration,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_retries: limits::MAX_RETRIES,
            rate_limit_backoff: limits::RATE_LIMIT_BACKOFF,
            retry_transient: false,
            ffmpeg_path: PathBuf::from(search::FFMPEG_PROGRAM),
            outcome_buffer: workers::OUTCOME_BUFFER_SIZE,
            duration_tolerance: Duration::from_secs_f64(selector::DURATION_TOLERANCE_SECS),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Also write logs to `<logs_dir>/<catalog>.log`
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

impl AppConfig {
    /// Load configuration with precedence:
    /// 1. `config_file_override` (must exist)
    /// 2. File named by `PLAYLIST_FETCHER_CONFIG` (must exist)
    /// 3. `./playlist-fetcher.toml`
    /// 4. `<user config dir>/playlist-fetcher/config.toml`
    /// 5. Default values
    ///
    /// The Tor password always comes from `PLAYLIST_FETCHER_TOR_PASSWORD`
    /// when set. The result is validated.
    pub async fn load(config_file_override: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = config_file_override
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(env::CONFIG_FILE).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Self::load_from_file(&path).await?
            }
            None => match Self::find_config_file() {
                Some(path) => Self::load_from_file(&path).await?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_tor_password(std::env::var(env::TOR_PASSWORD).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };

        for (field, path) in [
            ("paths.catalogs_dir", &self.paths.catalogs_dir),
            ("paths.exports_dir", &self.paths.exports_dir),
            ("paths.downloads_dir", &self.paths.downloads_dir),
            ("paths.logs_dir", &self.paths.logs_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(invalid(field, String::new(), "Path cannot be empty"));
            }
        }

        if self.search.requests_per_second == 0 {
            return Err(invalid(
                "search.requests_per_second",
                "0".to_string(),
                "Search rate must be at least 1 request per second",
            ));
        }

        if self.search.results_per_query == 0 {
            return Err(invalid(
                "search.results_per_query",
                "0".to_string(),
                "At least one result per query is required",
            ));
        }

        if self.download.worker_count == 0 {
            return Err(invalid(
                "download.worker_count",
                "0".to_string(),
                "At least one worker is required",
            ));
        }

        if self.download.max_retries == 0 {
            return Err(invalid(
                "download.max_retries",
                "0".to_string(),
                "At least one attempt per task is required",
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(
                "logging.level",
                self.logging.level.clone(),
                "Expected one of error, warn, info, debug, trace",
            ));
        }

        self.to_resolver_config().validate()?;
        self.to_worker_config()
            .validate()
            .map_err(|e| invalid("download", String::new(), &e.to_string()))?;
        Ok(())
    }

    /// Runtime settings for the resolve stage
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_retries: self.resolver.max_retries,
            rate_limit_backoff: self.resolver.rate_limit_backoff,
            concurrency: self.resolver.concurrency,
        }
    }

    /// Runtime settings for download workers
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.download.worker_count,
            max_retries: self.download.max_retries,
            rate_limit_backoff: self.download.rate_limit_backoff,
            retry_transient: self.download.retry_transient,
            duration_tolerance_seconds: self.download.duration_tolerance.as_secs_f64(),
            outcome_buffer_size: self.download.outcome_buffer,
            ..WorkerConfig::default()
        }
    }

    /// Runtime settings for the download coordinator
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_downloads_dir(&self.paths.downloads_dir)
            .with_worker_config(self.to_worker_config())
    }

    fn apply_tor_password(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.identity.password = Some(password);
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(path) = Self::user_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Per-user config file location, if the platform has one
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("playlist-fetcher").join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}
