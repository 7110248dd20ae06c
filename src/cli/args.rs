//! Command-line argument parsing for Playlist Fetcher
//!
//! This module defines the CLI structure using clap derive macros: the
//! resolve and download stages, a combined `run`, and `status`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::constants::ledger::COMBINED_CATALOG;

/// Playlist Fetcher - match playlists to videos and fetch tagged audio
#[derive(Parser, Debug)]
#[command(
    name = "playlist_fetcher",
    version,
    about = "Resolve playlist catalogs to online videos and download them as tagged MP3 files",
    long_about = "Reads playlist exports from the catalogs directory, finds the best matching video for
every track and records it in a resumable per-catalog ledger, then downloads, transcodes
and tags the matched audio with a pool of concurrent workers."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find a video for every unresolved track and record it in the ledger
    Resolve(ResolveArgs),

    /// Download, transcode and tag every resolved track
    Download(DownloadArgs),

    /// Resolve, then download
    Run(RunArgs),

    /// Show ledger and catalog progress
    Status,
}

/// Arguments for the resolve command
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Only resolve this catalog (file stem in the catalogs directory)
    #[arg(short, long, conflicts_with = "combined")]
    pub catalog: Option<String>,

    /// Merge all catalogs into one `combined` ledger, skipping tracks any
    /// ledger already has
    #[arg(long)]
    pub combined: bool,

    /// Remove `NOT FOUND` rows first so those tracks are searched again
    #[arg(long)]
    pub retry_not_found: bool,
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Only download this catalog's ledger
    #[arg(short, long)]
    pub catalog: Option<String>,

    /// Number of concurrent download workers (overrides the config file)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Also retry failures that are not rate limits
    #[arg(long)]
    pub retry_transient: bool,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Number of concurrent download workers (overrides the config file)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }

    /// Stem of the log file for this invocation; `None` when the command
    /// does not process catalogs
    pub fn log_name(&self) -> Option<String> {
        let catalog = match &self.command {
            Commands::Resolve(args) => args.log_catalog(),
            Commands::Run(args) => args.resolve.log_catalog(),
            Commands::Download(args) => args.catalog.clone(),
            Commands::Status => return None,
        };
        Some(catalog.unwrap_or_else(|| COMBINED_CATALOG.to_string()))
    }
}

impl ResolveArgs {
    fn log_catalog(&self) -> Option<String> {
        if self.combined {
            None
        } else {
            self.catalog.clone()
        }
    }
}

impl DownloadArgs {
    /// Check argument values clap cannot
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from(["playlist_fetcher", "resolve", "--catalog", "road-trip", "--retry-not-found"]).unwrap();
        match &cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.catalog.as_deref(), Some("road-trip"));
                assert!(args.retry_not_found);
                assert!(!args.combined);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.log_name().as_deref(), Some("road-trip"));
    }

    #[test]
    fn test_combined_conflicts_with_catalog() {
        let result = Cli::try_parse_from(["playlist_fetcher", "resolve", "--combined", "--catalog", "x"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["playlist_fetcher", "resolve", "--combined"]).unwrap();
        assert_eq!(cli.log_name().as_deref(), Some("combined"));
    }

    #[test]
    fn test_download_args_validation() {
        let args = DownloadArgs {
            workers: Some(0),
            ..Default::default()
        };
        assert!(args.validate().is_err());
        assert!(DownloadArgs::default().validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::try_parse_from(["playlist_fetcher", "-q", "status"]).unwrap();
        assert_eq!(cli.log_level(), Some(tracing::Level::ERROR));
        assert_eq!(cli.log_name(), None);

        let cli = Cli::try_parse_from(["playlist_fetcher", "download", "-v"]).unwrap();
        assert_eq!(cli.log_level(), Some(tracing::Level::INFO));

        let cli = Cli::try_parse_from(["playlist_fetcher", "run"]).unwrap();
        assert_eq!(cli.log_level(), None);
    }
}
