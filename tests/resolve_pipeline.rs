//! Resolve stage tests: catalogs in, ledger rows out, with a scripted search
//! provider standing in for yt-dlp

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use playlist_fetcher::app::identity::IdentityRotator;
use playlist_fetcher::app::provider::SearchProvider;
use playlist_fetcher::app::{
    Candidate, Catalog, IdentityGuard, Ledger, Resolver, ResolverConfig, TrackRecord,
};
use playlist_fetcher::errors::{IdentityResult, ProviderError, ProviderResult};

/// Answers every query with one official candidate, after raising the
/// scripted errors for that query
#[derive(Default)]
struct ScriptedSearch {
    failures: Mutex<HashMap<String, Vec<String>>>,
    calls: AtomicU32,
}

impl ScriptedSearch {
    fn failing(query: &str, messages: &[&str]) -> Self {
        let search = Self::default();
        search.script(query, messages);
        search
    }

    fn script(&self, query: &str, messages: &[&str]) {
        self.failures.lock().unwrap().insert(
            query.to_string(),
            messages.iter().map(|m| m.to_string()).collect(),
        );
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str) -> ProviderResult<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut failures = self.failures.lock().unwrap();
            failures
                .get_mut(query)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };
        match next {
            Some(message) => Err(ProviderError::from_message(message)),
            None => Ok(vec![
                Candidate::new("lyrics01", format!("{} (Lyrics)", query), "Fan Uploads", Some(200.0)),
                Candidate::new("official1", format!("{} (Official Audio)", query), "Artist - Topic", Some(201.0)),
            ]),
        }
    }
}

#[derive(Default)]
struct CountingRotator(AtomicU32);

#[async_trait]
impl IdentityRotator for CountingRotator {
    async fn rotate(&self) -> IdentityResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config() -> ResolverConfig {
    ResolverConfig {
        rate_limit_backoff: Duration::ZERO,
        ..Default::default()
    }
}

fn catalog(name: &str, tracks: &[(&str, &str)]) -> Catalog {
    Catalog::new(
        name,
        tracks
            .iter()
            .map(|(artist, title)| TrackRecord::new(*artist, *title, Some(200.0), name))
            .collect(),
    )
}

#[tokio::test]
async fn test_second_run_makes_no_searches() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::default());
    let resolver = Resolver::new(
        ledger.clone(),
        search.clone(),
        Arc::new(IdentityGuard::disabled()),
        config(),
    )
    .unwrap();

    let mix = catalog("mix", &[("Daft Punk", "One More Time"), ("Air", "La Femme d'Argent")]);
    let first = resolver.resolve_catalog(&mix).await.unwrap();
    assert_eq!(first.resolved, 2);
    assert_eq!(search.calls(), 2);

    let second = resolver.resolve_catalog(&mix).await.unwrap();
    assert_eq!(second.processed(), 0);
    assert_eq!(second.already_resolved, 2);
    assert_eq!(search.calls(), 2);

    let records = ledger.records("mix").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].link.url(), Some("https://www.youtube.com/watch?v=official1"));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_keys_are_normalized_across_runs() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::default());
    let resolver = Resolver::new(
        ledger.clone(),
        search.clone(),
        Arc::new(IdentityGuard::disabled()),
        config(),
    )
    .unwrap();

    resolver
        .resolve_catalog(&catalog("mix", &[("Daft Punk", "One More Time")]))
        .await
        .unwrap();
    let respelled = resolver
        .resolve_catalog(&catalog("mix", &[("  DAFT PUNK ", "one more time  ")]))
        .await
        .unwrap();

    assert_eq!(respelled.already_resolved, 1);
    assert_eq!(search.calls(), 1);
    assert_eq!(ledger.records("mix").await.unwrap().len(), 1);
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_rate_limits_rotate_identity_then_resolve() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = ScriptedSearch::failing("Artist - A", &["HTTP Error 429: Too Many Requests"; 2]);
    search.script("Artist - B", &["ERROR: rate limit exceeded"; 2]);
    let search = Arc::new(search);
    let rotator = Arc::new(CountingRotator::default());
    let identity = Arc::new(IdentityGuard::with_min_interval(rotator.clone(), Duration::ZERO));

    let resolver = Resolver::new(ledger.clone(), search.clone(), identity, config()).unwrap();
    let summary = resolver
        .resolve_catalog(&catalog("mix", &[("Artist", "A"), ("Artist", "B")]))
        .await
        .unwrap();

    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.rate_limited, 4);
    assert_eq!(search.calls(), 6);
    assert_eq!(rotator.0.load(Ordering::SeqCst), 4);

    let records = ledger.records("mix").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_not_found()));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_single_rate_limited_track_rotates_twice() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::failing(
        "Artist - A",
        &["HTTP Error 429: Too Many Requests"; 2],
    ));
    let rotator = Arc::new(CountingRotator::default());
    let identity = Arc::new(IdentityGuard::with_min_interval(rotator.clone(), Duration::ZERO));

    let resolver = Resolver::new(ledger.clone(), search.clone(), identity, config()).unwrap();
    let summary = resolver
        .resolve_catalog(&catalog("mix", &[("Artist", "A"), ("Artist", "B")]))
        .await
        .unwrap();

    assert_eq!(rotator.0.load(Ordering::SeqCst), 2);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.not_found, 0);
    assert_eq!(search.calls(), 4);

    let records = ledger.records("mix").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_not_found()));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_other_error_records_not_found_row() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::failing("Nobody - Nothing", &["Video unavailable"]));

    let resolver = Resolver::new(
        ledger.clone(),
        search.clone(),
        Arc::new(IdentityGuard::disabled()),
        config(),
    )
    .unwrap();
    let summary = resolver
        .resolve_catalog(&catalog("mix", &[("Nobody", "Nothing")]))
        .await
        .unwrap();

    assert_eq!(summary.not_found, 1);
    assert_eq!(search.calls(), 1);

    let records = ledger.records("mix").await.unwrap();
    assert!(records[0].is_not_found());
    assert!(records[0].matched_title.is_empty());
    assert!(records[0].uploader.is_empty());
    assert_eq!(records[0].matched_duration_seconds, None);

    let text = std::fs::read_to_string(ledger.path("mix")).unwrap();
    assert!(text.lines().any(|line| line == "Nobody,Nothing,NOT FOUND,,,"));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_not_found_rows_can_be_retried_explicitly() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::failing("Artist - A", &["Video unavailable"]));
    let resolver = Resolver::new(
        ledger.clone(),
        search.clone(),
        Arc::new(IdentityGuard::disabled()),
        config(),
    )
    .unwrap();
    let mix = catalog("mix", &[("Artist", "A")]);

    resolver.resolve_catalog(&mix).await.unwrap();
    // A NOT FOUND row is terminal for ordinary runs
    assert_eq!(resolver.resolve_catalog(&mix).await.unwrap().processed(), 0);

    assert_eq!(ledger.drop_not_found("mix").await.unwrap(), 1);
    let retried = resolver.resolve_catalog(&mix).await.unwrap();
    assert_eq!(retried.resolved, 1);
    assert_eq!(search.calls(), 2);
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_combined_run_skips_keys_resolved_in_any_ledger() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path()).await.unwrap());
    let search = Arc::new(ScriptedSearch::default());
    let resolver = Resolver::new(
        ledger.clone(),
        search.clone(),
        Arc::new(IdentityGuard::disabled()),
        config(),
    )
    .unwrap();

    let road = catalog("road", &[("Artist", "A"), ("Artist", "B")]);
    let party = catalog("party", &[("artist", "b"), ("Artist", "C")]);
    resolver.resolve_catalog(&road).await.unwrap();

    let already = ledger.resolved_keys_all().await.unwrap();
    let combined = Catalog::combine("combined", &[road, party]).without_keys(&already);
    assert_eq!(combined.len(), 1);

    let summary = resolver.resolve_catalog(&combined).await.unwrap();
    assert_eq!(summary.resolved, 1);
    assert_eq!(search.calls(), 3);
    assert_eq!(ledger.records("combined").await.unwrap()[0].title, "C");
    ledger.shutdown().await;
}
