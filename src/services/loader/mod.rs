//! Bulk loader: streams validated rows into the graph store in batches.
//!
//! A blocking reader task parses the staged file and hands fixed-size
//! batches over a bounded channel; the async side commits them one at a time.
//! At most `CHANNEL_DEPTH + 1` batches are held in memory.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::db::{GraphStore, StoreError};
use crate::models::{DatasetKind, NodeRecord, RelationshipRecord, StagedFile};
use crate::services::validation::{DatasetReader, DatasetRecord, Row};

/// Batches read ahead of the committing side
const CHANNEL_DEPTH: usize = 2;

/// Errors raised while loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read {kind} file during load after {committed_rows} committed rows: {reason}")]
    Read {
        kind: DatasetKind,
        committed_rows: u64,
        reason: String,
    },

    #[error("Loader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LoadError {
    /// Rows of the failing kind already committed
    pub fn committed_rows(&self) -> u64 {
        match self {
            LoadError::Store(err) => err.committed_rows(),
            LoadError::Read { committed_rows, .. } => *committed_rows,
            LoadError::Task(_) => 0,
        }
    }
}

/// Rows and batches committed for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub rows: u64,
    pub batches: u64,
}

/// A record type the store can commit in batches
#[async_trait]
pub trait Loadable: DatasetRecord + Sync {
    async fn commit(store: &dyn GraphStore, rows: &[Self]) -> Result<(), StoreError>;
}

#[async_trait]
impl Loadable for NodeRecord {
    async fn commit(store: &dyn GraphStore, rows: &[Self]) -> Result<(), StoreError> {
        store.commit_node_batch(rows).await
    }
}

#[async_trait]
impl Loadable for RelationshipRecord {
    async fn commit(store: &dyn GraphStore, rows: &[Self]) -> Result<(), StoreError> {
        store.commit_relationship_batch(rows).await
    }
}

/// Loads staged files into a graph store
#[derive(Clone)]
pub struct BulkLoader {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Loads every node row. Must complete before relationships are loaded.
    pub async fn load_nodes(&self, file: &StagedFile) -> Result<LoadProgress, LoadError> {
        self.load::<NodeRecord>(file).await
    }

    /// Loads every relationship row. Endpoints must already be committed.
    pub async fn load_relationships(&self, file: &StagedFile) -> Result<LoadProgress, LoadError> {
        self.load::<RelationshipRecord>(file).await
    }

    async fn load<T: Loadable>(&self, file: &StagedFile) -> Result<LoadProgress, LoadError> {
        let (tx, mut rx) = mpsc::channel::<Result<Vec<T>, String>>(CHANNEL_DEPTH);
        let path = file.path.clone();
        let batch_size = self.batch_size;

        let producer =
            tokio::task::spawn_blocking(move || read_batches::<T>(&path, batch_size, &tx));

        let mut progress = LoadProgress::default();

        while let Some(batch) = rx.recv().await {
            let batch = batch.map_err(|reason| LoadError::Read {
                kind: T::KIND,
                committed_rows: progress.rows,
                reason,
            })?;

            if let Err(err) = T::commit(self.store.as_ref(), &batch).await {
                warn!(
                    "{} batch {} rejected by {} after {} rows: {}",
                    T::KIND,
                    progress.batches,
                    self.store.backend_name(),
                    progress.rows,
                    err
                );
                return Err(StoreError::PartialLoad {
                    kind: T::KIND,
                    failed_batch: progress.batches,
                    committed_rows: progress.rows,
                    reason: err.to_string(),
                }
                .into());
            }

            progress.batches += 1;
            progress.rows += batch.len() as u64;
            debug!(
                "Committed {} batch {} ({} rows total)",
                T::KIND,
                progress.batches - 1,
                progress.rows
            );
        }

        producer.await?;

        info!(
            "Loaded {} {} rows in {} batches from '{}'",
            progress.rows,
            T::KIND,
            progress.batches,
            file.original_name
        );

        Ok(progress)
    }
}

/// Reads the file and sends full batches; stops early if the receiver is gone
fn read_batches<T: DatasetRecord>(
    path: &Path,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Vec<T>, String>>,
) {
    let reader = match DatasetReader::<T>::open(path) {
        Ok(reader) => reader,
        Err(err) => {
            let _ = tx.blocking_send(Err(err.to_string()));
            return;
        }
    };

    let mut batch = Vec::with_capacity(batch_size);

    for row in reader {
        let record = match row {
            Ok(Row {
                parsed: Ok(record), ..
            }) => record,
            Ok(Row {
                number,
                line,
                parsed: Err(errors),
            }) => {
                let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                let _ = tx.blocking_send(Err(format!(
                    "row {} (line {}) is no longer valid: {}",
                    number,
                    line,
                    details.join("; ")
                )));
                return;
            }
            Err(err) => {
                let _ = tx.blocking_send(Err(err.to_string()));
                return;
            }
        };

        batch.push(record);
        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(Ok(full)).is_err() {
                return;
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(Ok(batch));
    }
}
