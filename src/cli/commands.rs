//! Command handlers for Playlist Fetcher CLI
//!
//! This module implements the command handlers that turn CLI arguments and
//! the loaded configuration into resolver and coordinator runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::app::{
    discover_catalogs, load_catalog, load_named_catalog, Catalog, Coordinator, Ffmpeg,
    IdentityGuard, Ledger, LoftyTags, MediaTools, Resolver, SessionResult, TorControl, YtDlp,
};
use crate::cli::{DownloadArgs, DownloadProgress, ProgressConfig, ResolveArgs, ResolveProgress, RunArgs};
use crate::config::AppConfig;
use crate::constants::ledger::COMBINED_CATALOG;
use crate::errors::{AppError, CatalogError, Result};

/// Handle the resolve command
///
/// Resolves every catalog into its own ledger, one named catalog, or all
/// catalogs merged into the `combined` ledger.
pub async fn handle_resolve(config: &AppConfig, args: ResolveArgs, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let ledger = Arc::new(Ledger::open(&config.paths.exports_dir).await?);

    let outcome = resolve_with_ledger(config, &ledger, &args, quiet).await;
    ledger.shutdown().await;
    outcome?;

    info!("Resolve command completed in {:?}", start_time.elapsed());
    Ok(())
}

/// Handle the download command
pub async fn handle_download(config: &AppConfig, args: DownloadArgs, quiet: bool) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let start_time = Instant::now();

    let mut config = config.clone();
    if let Some(workers) = args.workers {
        config.download.worker_count = workers;
    }
    if args.retry_transient {
        config.download.retry_transient = true;
    }
    config.validate()?;

    let ledger = Ledger::open(&config.paths.exports_dir).await?;
    let outcome = download_with_ledger(&config, &ledger, args.catalog.as_deref(), quiet).await;
    ledger.shutdown().await;
    let result = outcome?;

    if let Some(result) = result {
        print_session_summary(&result);
    }
    info!("Download command completed in {:?}", start_time.elapsed());
    Ok(())
}

/// Handle the run command: resolve, then download what was resolved
pub async fn handle_run(config: &AppConfig, args: RunArgs, quiet: bool) -> Result<()> {
    let start_time = Instant::now();

    let mut config = config.clone();
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(AppError::generic("Number of workers must be greater than 0"));
        }
        config.download.worker_count = workers;
    }
    config.validate()?;

    let ledger = Arc::new(Ledger::open(&config.paths.exports_dir).await?);
    let outcome = async {
        // Only the ledgers this run resolved into are downloaded
        let names = resolve_with_ledger(&config, &ledger, &args.resolve, quiet).await?;
        if names.is_empty() {
            println!("Nothing was resolved; skipping download.");
            return Ok(None);
        }
        download_ledgers(&config, &ledger, &names, quiet).await
    }
    .await;
    ledger.shutdown().await;

    if let Some(result) = outcome? {
        print_session_summary(&result);
    }
    info!("Run command completed in {:?}", start_time.elapsed());
    Ok(())
}

/// Handle the status command
pub async fn handle_status(config: &AppConfig) -> Result<()> {
    let ledger = Ledger::open(&config.paths.exports_dir).await?;
    let outcome = print_status(config, &ledger).await;
    ledger.shutdown().await;
    outcome
}

/// Resolve the requested catalogs; returns the ledgers that were resolved into
async fn resolve_with_ledger(
    config: &AppConfig,
    ledger: &Arc<Ledger>,
    args: &ResolveArgs,
    quiet: bool,
) -> Result<Vec<String>> {
    let Some(catalogs) = load_catalogs(config, args.catalog.as_deref())? else {
        return Ok(Vec::new());
    };

    let resolver = Resolver::new(
        ledger.clone(),
        Arc::new(build_search(config)),
        build_identity(config),
        config.to_resolver_config(),
    )?
    .with_observer(Arc::new(ResolveProgress::new(ProgressConfig::for_quiet(quiet))));

    resolve_catalogs(ledger, &resolver, &catalogs, args).await
}

async fn resolve_catalogs(
    ledger: &Ledger,
    resolver: &Resolver,
    catalogs: &[Catalog],
    args: &ResolveArgs,
) -> Result<Vec<String>> {
    if args.combined {
        if args.retry_not_found {
            for name in ledger.list_catalogs().await? {
                drop_not_found(ledger, &name).await?;
            }
        }

        let already = ledger.resolved_keys_all().await?;
        let combined = Catalog::combine(COMBINED_CATALOG, catalogs).without_keys(&already);
        if combined.is_empty() {
            println!("Everything already resolved");
            let existing = ledger.list_catalogs().await?;
            if existing.iter().any(|name| name == COMBINED_CATALOG) {
                return Ok(vec![COMBINED_CATALOG.to_string()]);
            }
            return Ok(Vec::new());
        }
        resolver.resolve_catalog(&combined).await?;
        return Ok(vec![COMBINED_CATALOG.to_string()]);
    }

    let mut names = Vec::with_capacity(catalogs.len());
    for catalog in catalogs {
        if args.retry_not_found {
            drop_not_found(ledger, &catalog.name).await?;
        }
        resolver.resolve_catalog(catalog).await?;
        names.push(catalog.name.clone());
    }
    Ok(names)
}

async fn download_with_ledger(
    config: &AppConfig,
    ledger: &Ledger,
    catalog: Option<&str>,
    quiet: bool,
) -> Result<Option<SessionResult>> {
    let names = match catalog {
        Some(name) => vec![name.to_string()],
        None => ledger.list_catalogs().await?,
    };
    download_ledgers(config, ledger, &names, quiet).await
}

async fn download_ledgers(
    config: &AppConfig,
    ledger: &Ledger,
    names: &[String],
    quiet: bool,
) -> Result<Option<SessionResult>> {
    if names.is_empty() {
        println!(
            "No ledgers found in {}. Run 'playlist_fetcher resolve' first.",
            config.paths.exports_dir.display()
        );
        return Ok(None);
    }

    let coordinator_config = config.to_coordinator_config();
    let display = DownloadProgress::new(
        ProgressConfig::for_quiet(quiet),
        coordinator_config.worker_config.worker_count,
    );
    let coordinator = Coordinator::new(coordinator_config, build_media_tools(config), build_identity(config))
        .with_observer(Arc::new(display));

    let result = coordinator.run_catalogs(ledger, names).await?;
    Ok(Some(result))
}

async fn drop_not_found(ledger: &Ledger, catalog: &str) -> Result<()> {
    let removed = ledger.drop_not_found(catalog).await?;
    if removed > 0 {
        println!("'{}': {} NOT FOUND tracks will be searched again", catalog, removed);
    }
    Ok(())
}

/// Load the requested catalog, or every catalog in the catalogs directory
///
/// Returns `None` after telling the user when there is nothing to do.
fn load_catalogs(config: &AppConfig, name: Option<&str>) -> Result<Option<Vec<Catalog>>> {
    let dir = &config.paths.catalogs_dir;

    if let Some(name) = name {
        return Ok(Some(vec![load_named_catalog(dir, name)?]));
    }

    let paths = match discover_catalogs(dir) {
        Ok(paths) => paths,
        Err(CatalogError::DirectoryNotFound { .. }) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    if paths.is_empty() {
        println!("No catalogs found in {}", dir.display());
        return Ok(None);
    }

    let catalogs = paths
        .iter()
        .map(|path| load_catalog(path))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(catalogs))
}

fn build_identity(config: &AppConfig) -> Arc<IdentityGuard> {
    if !config.identity.enabled {
        return Arc::new(IdentityGuard::disabled());
    }
    if config.identity.password.is_none() {
        warn!("Identity rotation enabled without a control port password");
    }
    let control = TorControl::new(
        config.identity.control_addr.clone(),
        config.identity.password.clone(),
    );
    Arc::new(IdentityGuard::with_min_interval(
        Arc::new(control),
        config.identity.min_interval,
    ))
}

fn build_search(config: &AppConfig) -> YtDlp {
    YtDlp::new(&config.search.yt_dlp_path)
        .with_results_per_query(config.search.results_per_query)
        .with_proxy(config.search.proxy.clone())
        .with_rate_limit(config.search.requests_per_second)
}

fn build_media_tools(config: &AppConfig) -> MediaTools {
    let tags = Arc::new(LoftyTags::new());
    MediaTools::new(
        Arc::new(build_search(config)),
        Arc::new(Ffmpeg::new(&config.download.ffmpeg_path)),
        tags.clone(),
        tags,
    )
}

async fn print_status(config: &AppConfig, ledger: &Ledger) -> Result<()> {
    let ledgers = ledger.list_catalogs().await?;
    if ledgers.is_empty() {
        println!("No ledgers in {}", config.paths.exports_dir.display());
    } else {
        println!(
            "{:<30} {:>10} {:>10} {:>8} {:>12}",
            "Ledger", "Resolved", "Not found", "Total", "Unresolved"
        );
    }

    for name in &ledgers {
        let records = match ledger.records(name).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping ledger '{}': {}", name, e);
                println!("{:<30} {:>10}", name, "unreadable");
                continue;
            }
        };
        let not_found = records.iter().filter(|r| r.is_not_found()).count();

        let unresolved = match load_named_catalog(&config.paths.catalogs_dir, name) {
            Ok(catalog) => {
                let resolved: HashSet<_> = records.iter().map(|r| r.key()).collect();
                catalog
                    .tracks
                    .iter()
                    .filter(|track| !resolved.contains(&track.key()))
                    .count()
                    .to_string()
            }
            Err(_) => "-".to_string(),
        };

        println!(
            "{:<30} {:>10} {:>10} {:>8} {:>12}",
            name,
            records.len() - not_found,
            not_found,
            records.len(),
            unresolved
        );
    }
    Ok(())
}

fn print_session_summary(result: &SessionResult) {
    println!();
    println!("Download Summary:");
    println!("   Catalogs: {}", result.catalogs.join(", "));
    println!("   Tasks: {}", result.total_tasks);
    println!("   Downloaded: {}", result.downloaded);
    println!("   Skipped (already valid): {}", result.skipped);
    println!("   Failed: {}", result.failed);
    println!("   NOT FOUND rows: {}", result.not_found_rows);
    if result.rotations > 0 {
        println!("   Identity rotations: {}", result.rotations);
    }
    println!("   Duration: {:.1?}", result.total_duration);

    for (label, error) in &result.failures {
        println!("   ✗ {}: {}", label, error);
    }
    if result.interrupted {
        println!("Stopped early: {} pending tasks were not started.", result.dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::provider::SearchProvider;
    use crate::app::{Candidate, ResolutionRecord, ResolverConfig, TrackRecord};
    use crate::errors::ProviderResult;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.catalogs_dir = dir.path().join("catalogs");
        config.paths.exports_dir = dir.path().join("exports");
        config.paths.downloads_dir = dir.path().join("downloads");
        config.paths.logs_dir = dir.path().join("logs");
        config
    }

    #[test]
    fn test_load_catalogs_missing_directory_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert!(load_catalogs(&config, None).unwrap().is_none());
    }

    #[test]
    fn test_load_catalogs_reads_every_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.paths.catalogs_dir).unwrap();
        for name in ["a", "b"] {
            std::fs::write(
                config.paths.catalogs_dir.join(format!("{}.csv", name)),
                "Track Name,Artist Name(s),Duration (ms)\nSong,Band,200000\n",
            )
            .unwrap();
        }

        let catalogs = load_catalogs(&config, None).unwrap().unwrap();
        assert_eq!(catalogs.len(), 2);
        assert_eq!(catalogs[0].name, "a");

        let named = load_catalogs(&config, Some("b")).unwrap().unwrap();
        assert_eq!(named[0].name, "b");
        assert!(load_catalogs(&config, Some("missing")).is_err());
    }

    #[test]
    fn test_identity_disabled_by_default() {
        let guard = build_identity(&AppConfig::default());
        assert!(!guard.is_enabled());

        let mut config = AppConfig::default();
        config.identity.enabled = true;
        assert!(build_identity(&config).is_enabled());
    }

    #[tokio::test]
    async fn test_download_without_ledgers_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let ledger = Ledger::open(&config.paths.exports_dir).await.unwrap();

        let result = download_with_ledger(&config, &ledger, None, true).await.unwrap();
        assert!(result.is_none());
        ledger.shutdown().await;
    }

    /// Answers every query with one official upload
    struct OfficialSearch;

    #[async_trait]
    impl SearchProvider for OfficialSearch {
        async fn search(&self, query: &str) -> ProviderResult<Vec<Candidate>> {
            Ok(vec![Candidate::new(
                "official1",
                format!("{} (Official Audio)", query),
                "Band - Topic",
                Some(200.0),
            )])
        }
    }

    fn resolver(ledger: &Arc<Ledger>) -> Resolver {
        let config = ResolverConfig {
            rate_limit_backoff: Duration::ZERO,
            ..Default::default()
        };
        Resolver::new(
            ledger.clone(),
            Arc::new(OfficialSearch),
            Arc::new(IdentityGuard::disabled()),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_downloads_only_the_ledgers_it_resolved() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.paths.catalogs_dir).unwrap();
        std::fs::write(
            config.paths.catalogs_dir.join("a.csv"),
            "Track Name,Artist Name(s),Duration (ms)\nSong,Band,200000\n",
        )
        .unwrap();

        let ledger = Arc::new(Ledger::open(&config.paths.exports_dir).await.unwrap());
        let old = TrackRecord::new("Old", "Tune", Some(180.0), "stale");
        ledger
            .append("stale", ResolutionRecord::found(&old, &Candidate::new("stale01", "Old - Tune", "Old", Some(180.0))))
            .await
            .unwrap();

        let catalogs = load_catalogs(&config, None).unwrap().unwrap();
        let names = resolve_catalogs(&ledger, &resolver(&ledger), &catalogs, &ResolveArgs::default())
            .await
            .unwrap();

        assert_eq!(names, vec!["a".to_string()]);
        assert_eq!(ledger.list_catalogs().await.unwrap(), vec!["a", "stale"]);
        assert_eq!(ledger.records("a").await.unwrap().len(), 1);
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_combined_run_targets_the_combined_ledger() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let ledger = Arc::new(Ledger::open(&config.paths.exports_dir).await.unwrap());
        let args = ResolveArgs {
            combined: true,
            ..Default::default()
        };

        let tracks = vec![TrackRecord::new("Band", "Song", Some(200.0), "a")];
        let catalogs = vec![Catalog::new("a", tracks)];
        let names = resolve_catalogs(&ledger, &resolver(&ledger), &catalogs, &args).await.unwrap();
        assert_eq!(names, vec![COMBINED_CATALOG.to_string()]);

        // Nothing new to resolve, but the combined ledger still has work
        let again = resolve_catalogs(&ledger, &resolver(&ledger), &catalogs, &args).await.unwrap();
        assert_eq!(again, vec![COMBINED_CATALOG.to_string()]);
        ledger.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_resolved_means_nothing_to_download() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let ledger = Arc::new(Ledger::open(&config.paths.exports_dir).await.unwrap());

        let names = resolve_with_ledger(&config, &ledger, &ResolveArgs::default(), true)
            .await
            .unwrap();
        assert!(names.is_empty());
        ledger.shutdown().await;
    }
}
