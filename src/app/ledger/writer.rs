//! Per-catalog ledger writer task
//!
//! Every write to a ledger file goes through exactly one writer task per
//! catalog. Callers send requests over a bounded channel and wait for the
//! acknowledgement, which is only sent after the row has been synced to
//! disk. Because the task is the sole writer, its duplicate check and the
//! write that follows cannot interleave with another append.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store;
use crate::app::models::{ResolutionRecord, TrackKey};
use crate::constants::ledger::WRITER_QUEUE_CAPACITY;
use crate::errors::{LedgerError, LedgerResult};

/// Keys with a persisted row, shared between the writer and readers
pub type ResolvedKeys = Arc<RwLock<HashSet<TrackKey>>>;

/// Result of an append request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new row was written and synced
    Written,
    /// The key already had a row; nothing was written
    Duplicate,
}

/// Requests handled by the writer task
#[derive(Debug)]
enum WriterRequest {
    Append {
        record: Box<ResolutionRecord>,
        reply: oneshot::Sender<LedgerResult<AppendOutcome>>,
    },
    DropNotFound {
        reply: oneshot::Sender<LedgerResult<Vec<TrackKey>>>,
    },
    Shutdown,
}

/// Sending side of a writer task
#[derive(Debug, Clone)]
pub struct WriterHandle {
    catalog: String,
    sender: mpsc::Sender<WriterRequest>,
}

impl WriterHandle {
    /// Spawn the writer task for one catalog
    pub fn spawn(catalog: String, path: PathBuf, resolved: ResolvedKeys) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let writer = LedgerWriter {
            catalog: catalog.clone(),
            path,
            resolved,
            file: None,
        };
        let task = tokio::spawn(writer.run(receiver));
        (Self { catalog, sender }, task)
    }

    /// Append a record and wait until it is durable (or rejected as duplicate)
    pub async fn append(&self, record: ResolutionRecord) -> LedgerResult<AppendOutcome> {
        let (reply, response) = oneshot::channel();
        self.send(WriterRequest::Append {
            record: Box::new(record),
            reply,
        })
        .await?;
        response.await.map_err(|_| self.closed())?
    }

    /// Rewrite the ledger without `NOT FOUND` rows
    pub async fn drop_not_found(&self) -> LedgerResult<Vec<TrackKey>> {
        let (reply, response) = oneshot::channel();
        self.send(WriterRequest::DropNotFound { reply }).await?;
        response.await.map_err(|_| self.closed())?
    }

    /// Ask the task to stop once earlier requests are done
    pub async fn shutdown(&self) {
        // A closed channel means the task is already gone
        let _ = self.sender.send(WriterRequest::Shutdown).await;
    }

    async fn send(&self, request: WriterRequest) -> LedgerResult<()> {
        self.sender.send(request).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> LedgerError {
        LedgerError::WriterClosed {
            catalog: self.catalog.clone(),
        }
    }
}

struct LedgerWriter {
    catalog: String,
    path: PathBuf,
    resolved: ResolvedKeys,
    file: Option<File>,
}

impl LedgerWriter {
    async fn run(mut self, mut receiver: mpsc::Receiver<WriterRequest>) {
        debug!("Ledger writer for '{}' started", self.catalog);

        while let Some(request) = receiver.recv().await {
            match request {
                WriterRequest::Append { record, reply } => {
                    let result = self.append(*record).await;
                    let _ = reply.send(result);
                }
                WriterRequest::DropNotFound { reply } => {
                    let result = self.drop_not_found().await;
                    let _ = reply.send(result);
                }
                WriterRequest::Shutdown => break,
            }
        }

        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all().await {
                warn!("Final sync of ledger {} failed: {}", self.path.display(), e);
            }
        }
        debug!("Ledger writer for '{}' stopped", self.catalog);
    }

    async fn append(&mut self, record: ResolutionRecord) -> LedgerResult<AppendOutcome> {
        let key = record.key();
        if self.is_resolved(&key) {
            debug!("Ledger '{}' already has {}", self.catalog, key);
            return Ok(AppendOutcome::Duplicate);
        }

        let row = store::encode_record(&record)?;
        self.write_row(&row).await?;

        self.resolved
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
        Ok(AppendOutcome::Written)
    }

    async fn drop_not_found(&mut self) -> LedgerResult<Vec<TrackKey>> {
        self.file = None;

        let path = self.path.clone();
        let removed = tokio::task::spawn_blocking(move || store::rewrite_without_not_found(&path))
            .await
            .map_err(|e| LedgerError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e.to_string()),
            })??;

        let mut resolved = self.resolved.write().unwrap_or_else(|e| e.into_inner());
        for key in &removed {
            resolved.remove(key);
        }
        drop(resolved);

        info!(
            "Removed {} NOT FOUND rows from ledger '{}'",
            removed.len(),
            self.catalog
        );
        Ok(removed)
    }

    fn is_resolved(&self, key: &TrackKey) -> bool {
        self.resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    async fn write_row(&mut self, row: &[u8]) -> LedgerResult<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open().await?,
        };

        let written = async {
            file.write_all(row).await?;
            file.sync_data().await
        }
        .await;

        match written {
            Ok(()) => {
                self.file = Some(file);
                Ok(())
            }
            // Handle is dropped; the next request reopens the file
            Err(source) => Err(LedgerError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Open for appending, writing the header into a new file and repairing
    /// a final row left without its newline
    async fn open(&self) -> LedgerResult<File> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;

        let len = file.metadata().await.map_err(io_err)?.len();
        if len == 0 {
            let header = store::encode_header()?;
            file.write_all(&header).await.map_err(io_err)?;
        } else {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1)).await.map_err(io_err)?;
            file.read_exact(&mut last).await.map_err(io_err)?;
            if last[0] != b'\n' {
                warn!(
                    "Ledger {} ends mid-row; terminating it before appending",
                    self.path.display()
                );
                file.write_all(b"\n").await.map_err(io_err)?;
            }
        }

        Ok(file)
    }
}
