//! Dataset validation.
//!
//! - **Schema**: expected header shapes and cell formats
//! - **Reader**: streaming typed row reader shared with the bulk loader
//! - **Structural**: per-file checks, every problem collected in one pass
//! - **Consistency**: cross-file referential integrity and duplicate ids

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod consistency;
pub mod reader;
pub mod schema;
pub mod structural;

pub use consistency::validate_consistency;
pub use reader::{DatasetReader, DatasetRecord, ReaderError, Row};
pub use schema::{ColumnKind, ColumnRole, ColumnSpec, CsvSchema};
pub use structural::{validate_pair, validate_structure};

/// A validation pass could not read its input at all
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read staged file {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Validation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ScanError {
    pub fn from_reader(path: &Path, err: ReaderError) -> Self {
        ScanError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}
