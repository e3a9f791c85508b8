//! Request-scoped staging of uploaded CSV files.
//!
//! Uploads are streamed to disk chunk by chunk without loading entire files
//! into memory. Every request gets its own directory under the scratch root,
//! removed when its [`StagingArea`] is dropped, so concurrent uploads can
//! never overwrite each other.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{DatasetKind, StagedFile};
use crate::services::config::IngestConfig;

/// Errors raised while persisting an upload
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload stream for '{name}' was interrupted: {source}")]
    Interrupted {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Upload '{name}' exceeds maximum allowed {limit} bytes")]
    TooLarge { name: String, limit: u64 },

    #[error("Staged file {path:?} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl StagingError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StagingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Scratch directory owned by a single ingestion request.
///
/// Dropping the area deletes the directory and every staged file in it,
/// whichever way the request ends.
#[derive(Debug)]
pub struct StagingArea {
    request_id: String,
    dir: tempfile::TempDir,
}

impl StagingArea {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deterministic path of a dataset file inside this area
    pub fn file_path(&self, kind: DatasetKind) -> PathBuf {
        self.dir.path().join(format!("{}.csv", kind.field_name()))
    }

    /// Removes the area now, reporting failures instead of swallowing them
    pub fn close(self) -> Result<(), StagingError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| StagingError::io(&path, e))?;
        debug!("Removed staging area {:?}", path);
        Ok(())
    }
}

/// Streams uploads into request-scoped staging areas
#[derive(Debug, Clone)]
pub struct FileStager {
    /// Root under which staging areas are created
    root: PathBuf,

    /// Maximum size of a single staged file in bytes
    max_file_size: u64,
}

impl FileStager {
    pub fn new(root: PathBuf, max_file_size: u64) -> Self {
        Self {
            root,
            max_file_size: max_file_size.max(1),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.scratch_dir.clone(), config.max_upload_bytes)
    }

    /// Creates the scratch root
    pub async fn init(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StagingError::io(&self.root, e))?;

        info!("File stager initialized: root={:?}", self.root);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Opens a fresh staging area keyed by a generated request id
    pub fn open_area(&self) -> Result<StagingArea, StagingError> {
        let request_id = format!("ingest_{}", Uuid::new_v4().simple());
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", request_id))
            .tempdir_in(&self.root)
            .map_err(|e| StagingError::io(&self.root, e))?;

        debug!("Opened staging area {:?} for {}", dir.path(), request_id);
        Ok(StagingArea { request_id, dir })
    }

    /// Writes the whole byte stream to the area's file for `kind`.
    ///
    /// The stream is consumed chunk by chunk; a SHA256 checksum is computed
    /// on the fly. The partially written file is left for the area's drop to
    /// remove if anything fails.
    pub async fn stage<S, E>(
        &self,
        area: &StagingArea,
        kind: DatasetKind,
        mut body: S,
        declared_name: Option<&str>,
        declared_mime_type: Option<&str>,
    ) -> Result<StagedFile, StagingError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        let path = area.file_path(kind);
        let original_name = declared_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(kind.field_name())
            .to_string();

        let mut file = File::create(&path)
            .await
            .map_err(|e| StagingError::io(&path, e))?;

        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StagingError::Interrupted {
                name: original_name.clone(),
                source: Box::new(e),
            })?;

            written += chunk.len() as u64;
            if written > self.max_file_size {
                warn!(
                    "Rejecting upload '{}' for {}: over {} bytes",
                    original_name,
                    area.request_id(),
                    self.max_file_size
                );
                return Err(StagingError::TooLarge {
                    name: original_name,
                    limit: self.max_file_size,
                });
            }

            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| StagingError::io(&path, e))?;
        }

        file.flush().await.map_err(|e| StagingError::io(&path, e))?;
        file.sync_all().await.map_err(|e| StagingError::io(&path, e))?;

        let checksum = format!("{:x}", hasher.finalize());

        info!(
            "Staged {} upload '{}' ({} bytes, sha256={}) for {}",
            kind,
            original_name,
            written,
            checksum,
            area.request_id()
        );

        Ok(StagedFile {
            path,
            original_name,
            size_bytes: written,
            declared_mime_type: declared_mime_type.map(str::to_string),
            checksum,
        })
    }

    /// Confirms a staged file is still on disk with the size that was written
    pub async fn verify(&self, staged: &StagedFile) -> Result<(), StagingError> {
        let metadata = fs::metadata(&staged.path)
            .await
            .map_err(|e| StagingError::io(&staged.path, e))?;

        if metadata.len() != staged.size_bytes {
            return Err(StagingError::SizeMismatch {
                path: staged.path.clone(),
                expected: staged.size_bytes,
                actual: metadata.len(),
            });
        }

        Ok(())
    }
}
