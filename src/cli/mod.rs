//! Command-line interface components
//!
//! This module contains CLI-specific code for the Playlist Fetcher
//! application: argument parsing, progress display and command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, DownloadArgs, GlobalArgs, ResolveArgs, RunArgs};
pub use commands::{handle_download, handle_resolve, handle_run, handle_status};
pub use progress::{DownloadProgress, ProgressConfig, ResolveProgress};
