//! Graph store abstraction used by the schema initializer and bulk loader.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DatasetKind, NodeRecord, RelationshipRecord};

/// Errors raised by a graph store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Schema initialization failed: {0}")]
    Schema(String),

    #[error("Batch commit failed: {0}")]
    Commit(String),

    /// A batch failed after earlier batches were already committed.
    /// Committed batches are not rolled back.
    #[error(
        "Loading {kind} failed at batch {failed_batch} after {committed_rows} rows were committed: {reason}"
    )]
    PartialLoad {
        kind: DatasetKind,
        failed_batch: u64,
        committed_rows: u64,
        reason: String,
    },
}

impl StoreError {
    /// Rows already committed when the error occurred
    pub fn committed_rows(&self) -> u64 {
        match self {
            StoreError::PartialLoad { committed_rows, .. } => *committed_rows,
            _ => 0,
        }
    }

    /// Zero-based index of the last batch known to be committed
    pub fn last_committed_batch(&self) -> Option<u64> {
        match self {
            StoreError::PartialLoad { failed_batch, .. } => failed_batch.checked_sub(1),
            _ => None,
        }
    }
}

/// Trait for graph store backends
///
/// Every commit call is atomic: either the whole batch is persisted or the
/// call fails and nothing from that batch is visible.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensures constraints and indexes exist. Repeated calls are no-ops.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Persists a batch of nodes as one unit
    async fn commit_node_batch(&self, rows: &[NodeRecord]) -> Result<(), StoreError>;

    /// Persists a batch of relationships as one unit.
    /// Endpoints must already be committed.
    async fn commit_relationship_batch(&self, rows: &[RelationshipRecord]) -> Result<(), StoreError>;

    /// Checks if the store is reachable
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Returns the backend name for logging
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_load_reports_committed_rows() {
        let err = StoreError::PartialLoad {
            kind: DatasetKind::Relationships,
            failed_batch: 3,
            committed_rows: 2000,
            reason: "connection reset".to_string(),
        };

        assert_eq!(err.committed_rows(), 2000);
        assert_eq!(err.last_committed_batch(), Some(2));
        let message = err.to_string();
        assert!(message.contains("relationships"));
        assert!(message.contains("batch 3"));
        assert!(message.contains("2000 rows"));
    }

    #[test]
    fn test_other_errors_have_no_committed_rows() {
        let err = StoreError::Schema("denied".to_string());
        assert_eq!(err.committed_rows(), 0);
        assert_eq!(err.last_committed_batch(), None);
    }
}
