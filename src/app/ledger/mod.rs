//! Resolution ledger
//!
//! Durable per-catalog record of resolution outcomes. Each catalog has one
//! CSV file under the exports directory and one writer task that owns it;
//! everything else reads through the in-memory key set the writer keeps in
//! step with the file.
//!
//! The ledger is the only resume state of the pipeline: a track with a row
//! (found or `NOT FOUND`) is never searched again unless its row is removed
//! with [`Ledger::drop_not_found`].

pub mod claims;
pub mod store;
pub mod writer;

pub use claims::{ClaimGuard, ClaimRegistry, ClaimStatus};
pub use store::LoadedLedger;
pub use writer::{AppendOutcome, ResolvedKeys, WriterHandle};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::models::{ResolutionRecord, TrackKey};
use crate::constants::paths;
use crate::errors::{LedgerError, LedgerResult};

/// Open ledger of one catalog
#[derive(Debug)]
struct CatalogLedger {
    path: PathBuf,
    resolved: ResolvedKeys,
    writer: WriterHandle,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CatalogLedger {
    fn contains(&self, key: &TrackKey) -> bool {
        self.resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    fn snapshot(&self) -> HashSet<TrackKey> {
        self.resolved.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// All ledgers under one exports directory
#[derive(Debug)]
pub struct Ledger {
    dir: PathBuf,
    catalogs: Mutex<HashMap<String, Arc<CatalogLedger>>>,
    claims: ClaimRegistry,
}

impl Ledger {
    /// Open the ledger directory, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> LedgerResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| LedgerError::Io {
                path: dir.clone(),
                source,
            })?;

        debug!("Opened ledger directory {}", dir.display());
        Ok(Self {
            dir,
            catalogs: Mutex::new(HashMap::new()),
            claims: ClaimRegistry::new(),
        })
    }

    /// Ledger directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the ledger of `catalog`
    pub fn path(&self, catalog: &str) -> PathBuf {
        store::ledger_path(&self.dir, catalog)
    }

    /// True if `key` has a row in the ledger of `catalog`
    pub async fn is_resolved(&self, catalog: &str, key: &TrackKey) -> LedgerResult<bool> {
        Ok(self.catalog(catalog).await?.contains(key))
    }

    /// Keys with a row in the ledger of `catalog`, as of now
    pub async fn load_resolved_keys(&self, catalog: &str) -> LedgerResult<HashSet<TrackKey>> {
        Ok(self.catalog(catalog).await?.snapshot())
    }

    /// Keys with a row in any ledger of the directory
    ///
    /// A CSV file that cannot be read as a ledger is skipped with a warning.
    pub async fn resolved_keys_all(&self) -> LedgerResult<HashSet<TrackKey>> {
        let mut all = HashSet::new();
        for name in self.list_catalogs().await? {
            match self.load_resolved_keys(&name).await {
                Ok(keys) => all.extend(keys),
                Err(e) => warn!("Skipping ledger '{}': {}", name, e),
            }
        }
        Ok(all)
    }

    /// Append a record to the ledger of `catalog`
    ///
    /// Returns once the row is durable. A record whose key already has a
    /// row is not written again and yields [`AppendOutcome::Duplicate`].
    pub async fn append(
        &self,
        catalog: &str,
        record: ResolutionRecord,
    ) -> LedgerResult<AppendOutcome> {
        let ledger = self.catalog(catalog).await?;
        ledger.writer.append(record).await
    }

    /// Unique rows of the ledger of `catalog`, in file order
    pub async fn records(&self, catalog: &str) -> LedgerResult<Vec<ResolutionRecord>> {
        // Holding the catalog open keeps writes and this read ordered: every
        // acknowledged append is already on disk.
        let ledger = self.catalog(catalog).await?;
        Ok(store::load(&ledger.path).await?.records)
    }

    /// Claim a track for resolution
    pub async fn try_claim(&self, catalog: &str, key: &TrackKey) -> LedgerResult<ClaimStatus> {
        let ledger = self.catalog(catalog).await?;
        if ledger.contains(key) {
            return Ok(ClaimStatus::AlreadyResolved);
        }

        let Some(guard) = self.claims.try_claim(catalog, key) else {
            return Ok(ClaimStatus::ClaimedByOther);
        };

        // The previous holder may have finished between the two checks
        if ledger.contains(key) {
            return Ok(ClaimStatus::AlreadyResolved);
        }
        Ok(ClaimStatus::Claimed(guard))
    }

    /// Remove the `NOT FOUND` rows of `catalog` so those tracks are resolved
    /// again; returns how many rows were removed
    pub async fn drop_not_found(&self, catalog: &str) -> LedgerResult<usize> {
        let ledger = self.catalog(catalog).await?;
        Ok(ledger.writer.drop_not_found().await?.len())
    }

    /// Names of catalogs that have a ledger file, sorted
    pub async fn list_catalogs(&self) -> LedgerResult<Vec<String>> {
        let io_err = |source| LedgerError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let is_ledger = path
                .extension()
                .is_some_and(|ext| ext == paths::CSV_EXTENSION);
            if is_ledger {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Stop every writer task after its pending requests are done
    pub async fn shutdown(&self) {
        let ledgers: Vec<_> = self.catalogs.lock().await.drain().collect();
        for (name, ledger) in ledgers {
            ledger.writer.shutdown().await;
            let task = ledger
                .task
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(task) = task {
                if let Err(e) = task.await {
                    warn!("Ledger writer for '{}' ended abnormally: {}", name, e);
                }
            }
        }
        debug!("Ledger writers stopped");
    }

    async fn catalog(&self, name: &str) -> LedgerResult<Arc<CatalogLedger>> {
        let mut catalogs = self.catalogs.lock().await;
        if let Some(ledger) = catalogs.get(name) {
            return Ok(Arc::clone(ledger));
        }

        let path = self.path(name);
        let loaded = store::load(&path).await?;
        if loaded.duplicates > 0 || loaded.invalid > 0 {
            warn!(
                "Ledger '{}': ignored {} duplicate and {} unreadable rows",
                name, loaded.duplicates, loaded.invalid
            );
        }
        info!(
            "Ledger '{}' has {} resolved tracks",
            name,
            loaded.records.len()
        );

        let resolved: ResolvedKeys = Arc::new(RwLock::new(loaded.keys()));
        let (writer, task) = WriterHandle::spawn(name.to_string(), path.clone(), resolved.clone());
        let ledger = Arc::new(CatalogLedger {
            path,
            resolved,
            writer,
            task: std::sync::Mutex::new(Some(task)),
        });

        catalogs.insert(name.to_string(), Arc::clone(&ledger));
        Ok(ledger)
    }
}
