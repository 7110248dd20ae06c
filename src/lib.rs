//! Playlist Fetcher Library
//!
//! A Rust library that matches playlist catalogs to online videos, records
//! every decision in a resumable ledger and downloads the matched audio as
//! tagged MP3 files with a pool of concurrent workers.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use errors::{AppError, Result};
