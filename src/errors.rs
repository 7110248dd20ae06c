//! Error types for Playlist Fetcher
//!
//! This module defines the error taxonomy for every stage of the pipeline.
//! Per-track and per-task errors are contained by their callers; only
//! configuration and setup errors travel all the way up to `main`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the candidate selector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The search returned no candidates at all
    #[error("No candidates to choose from")]
    EmptyInput,
}

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider-side throttling; worth rotating identity and retrying
    RateLimited,
    /// Anything else
    Other,
}

/// Classify a provider error message as rate-limit shaped or not
///
/// The search and download tools report throttling only through their
/// message text, so this looks for `429` or `rate limit` (case-insensitive).
/// This is fragile by nature: a typed status from the provider would be
/// better, and every classification in the crate goes through this one
/// function so it can be swapped out in one place.
pub fn classify_message(message: &str) -> ErrorClass {
    let lowered = message.to_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") {
        ErrorClass::RateLimited
    } else {
        ErrorClass::Other
    }
}

/// Errors raised by the external search/download/transcode capabilities
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider throttled the request
    #[error("Rate limited by provider: {message}")]
    RateLimited { message: String },

    /// Provider failed for any other reason
    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },

    /// External program could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Provider output could not be understood
    #[error("Unexpected provider output: {reason}")]
    Parse { reason: String },

    /// Local I/O while handling provider output
    #[error("Provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Build an error from a raw failure message, classifying it on the way
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_message(&message) {
            ErrorClass::RateLimited => Self::RateLimited { message },
            ErrorClass::Other => Self::Unavailable { message },
        }
    }

    /// Classification used by retry logic
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited { .. } => ErrorClass::RateLimited,
            ProviderError::Unavailable { message } => classify_message(message),
            ProviderError::Spawn { .. } | ProviderError::Parse { .. } | ProviderError::Io(_) => {
                ErrorClass::Other
            }
        }
    }

    /// True if the error looks like provider throttling
    pub fn is_rate_limited(&self) -> bool {
        self.class() == ErrorClass::RateLimited
    }
}

/// Resolution ledger (storage) errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// File system error on a ledger file
    #[error("Ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV content
    #[error("Ledger CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Header row does not match the ledger layout
    #[error("Unexpected ledger header in {path}: {found}")]
    InvalidHeader { path: PathBuf, found: String },

    /// Writer task for the catalog has stopped
    #[error("Ledger writer for catalog '{catalog}' is closed")]
    WriterClosed { catalog: String },
}

/// Network identity rotation errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Control endpoint unreachable
    #[error("Cannot reach identity control endpoint {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O during the control conversation
    #[error("Identity control I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Control endpoint answered with an error
    #[error("Identity control request rejected: {reply}")]
    Rejected { reply: String },

    /// Control conversation took too long
    #[error("Identity control timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

/// Catalog ingestion errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog directory missing
    #[error("Catalog directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// I/O while reading a catalog
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed catalog CSV
    #[error("Invalid catalog CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Requested catalog does not exist
    #[error("Unknown catalog: {name}")]
    UnknownCatalog { name: String },
}

/// Download task errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Fetch or transcode failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Writing tags to the finished file failed
    #[error("Failed to tag {path}: {reason}")]
    Tagging { path: PathBuf, reason: String },

    /// Reading the duration of an existing file failed
    #[error("Failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    /// Local file system error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Retries were used up
    #[error("Gave up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    /// Invalid worker or pool configuration
    #[error("Invalid download configuration: {0}")]
    ConfigurationError(String),
}

impl DownloadError {
    /// True if the failure should trigger identity rotation and a retry
    pub fn is_rate_limited(&self) -> bool {
        match self {
            DownloadError::Provider(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

/// Task queue and worker coordination errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Worker task panicked or was cancelled
    #[error("Worker {worker_id} terminated unexpectedly")]
    WorkerPanic { worker_id: u32 },

    /// Outcome channel closed before the pool drained
    #[error("Outcome channel closed")]
    ChannelClosed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file unreadable
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Provider(e) => e.is_rate_limited(),
            AppError::Download(e) => e.is_rate_limited(),
            AppError::Identity(IdentityError::Timeout { .. }) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Selection(_) => "selection",
            AppError::Provider(_) => "provider",
            AppError::Ledger(_) => "ledger",
            AppError::Identity(_) => "identity",
            AppError::Catalog(_) => "catalog",
            AppError::Download(_) => "download",
            AppError::Queue(_) => "queue",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Provider result type alias
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Ledger result type alias
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Identity result type alias
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
