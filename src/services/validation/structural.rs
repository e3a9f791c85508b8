//! Per-file structural validation.

use std::path::Path;

use tracing::{debug, info};

use crate::models::{
    DatasetKind, NodeRecord, RelationshipRecord, StagedFile, ValidationError, ValidationResult,
};

use super::reader::{DatasetReader, DatasetRecord, ReaderError};
use super::ScanError;

/// Validates the shape of a staged file against the schema for `kind`.
///
/// Every row is visited and every problem collected. Only failures to read
/// the file at all are returned as `Err`.
pub async fn validate_structure(
    file: &StagedFile,
    kind: DatasetKind,
) -> Result<ValidationResult, ScanError> {
    let path = file.path.clone();
    let result = tokio::task::spawn_blocking(move || match kind {
        DatasetKind::Nodes => scan::<NodeRecord>(&path),
        DatasetKind::Relationships => scan::<RelationshipRecord>(&path),
    })
    .await??;

    info!(
        "Structural validation of {} file '{}': {} ({} errors)",
        kind,
        file.original_name,
        if result.is_valid() { "valid" } else { "invalid" },
        result.errors().len()
    );

    Ok(result)
}

/// Validates both files concurrently; they are independent of each other
pub async fn validate_pair(
    nodes: &StagedFile,
    relationships: &StagedFile,
) -> Result<(ValidationResult, ValidationResult), ScanError> {
    tokio::try_join!(
        validate_structure(nodes, DatasetKind::Nodes),
        validate_structure(relationships, DatasetKind::Relationships),
    )
}

fn scan<T: DatasetRecord>(path: &Path) -> Result<ValidationResult, ScanError> {
    let mut reader = match DatasetReader::<T>::open(path) {
        Ok(reader) => reader,
        Err(err) => return header_outcome(path, err),
    };

    let mut errors = Vec::new();

    for row in reader.by_ref() {
        match row {
            Ok(row) => {
                if let Err(row_errors) = row.parsed {
                    errors.extend(row_errors);
                }
            }
            Err(ReaderError::Csv { row, source }) if !source.is_io_error() => {
                errors.push(ValidationError::file_level(format!(
                    "file could not be parsed as CSV after row {}: {}",
                    row, source
                )));
                break;
            }
            Err(err) => return Err(ScanError::from_reader(path, err)),
        }
    }

    debug!(
        "Scanned {} {} rows in {:?}, {} errors",
        reader.rows_read(),
        T::KIND,
        path,
        errors.len()
    );

    Ok(ValidationResult::from_errors(errors))
}

/// A file whose header cannot be read yields one structural error
fn header_outcome(path: &Path, err: ReaderError) -> Result<ValidationResult, ScanError> {
    match err {
        ReaderError::Header(errors) => Ok(ValidationResult::from_errors(errors)),
        ReaderError::Csv { source, .. } if !source.is_io_error() => {
            Ok(ValidationResult::from_errors(vec![ValidationError::file_level(
                format!("file could not be parsed as CSV: {}", source),
            )]))
        }
        other => Err(ScanError::from_reader(path, other)),
    }
}
