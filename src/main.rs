//! Playlist Fetcher CLI application
//!
//! Command-line interface for resolving playlist catalogs to videos and
//! downloading them as tagged MP3 files. Features a resumable ledger,
//! concurrent downloads and progress tracking.

use std::fs::{self, File};
use std::process;
use std::sync::Mutex;

use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Import CLI modules through the library
use playlist_fetcher::cli::{handle_download, handle_resolve, handle_run, handle_status, Cli, Commands};
use playlist_fetcher::config::AppConfig;
use playlist_fetcher::constants::paths;
use playlist_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.as_deref()).await?;

    init_logging(&cli, &config);

    info!("Playlist Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let quiet = cli.global.quiet;
    match cli.command {
        Commands::Resolve(args) => {
            info!("Executing resolve command");
            handle_resolve(&config, args, quiet).await
        }
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(&config, args, quiet).await
        }
        Commands::Run(args) => {
            info!("Executing run command");
            handle_run(&config, args, quiet).await
        }
        Commands::Status => handle_status(&config).await,
    }
}

/// Initialize logging from CLI verbosity and the `[logging]` config section
///
/// Console output goes to stderr. When file logging is enabled every
/// invocation that processes catalogs also logs to `logs/<catalog>.log`.
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .or_else(|| config.logging.level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("playlist_fetcher={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(cli.global.very_verbose);

    let mut file_error = None;
    let file = match cli.log_name().filter(|_| config.logging.file_logging) {
        Some(name) => match open_log_file(config, &name) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                file_error = Some(e);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    if let Some(e) = file_error {
        warn!("File logging disabled: {}", e);
    }
    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}

fn open_log_file(config: &AppConfig, name: &str) -> std::io::Result<File> {
    fs::create_dir_all(&config.paths.logs_dir)?;
    let path = config
        .paths
        .logs_dir
        .join(format!("{}.{}", name, paths::LOG_EXTENSION));
    File::options().create(true).append(true).open(path)
}
