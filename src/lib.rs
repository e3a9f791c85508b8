//! chaingraph: validated bulk ingestion of graph datasets.
//!
//! Accepts a node CSV and a relationship CSV, validates each file and the
//! references between them, then bulk-loads them into a graph store.

pub mod api;
pub mod db;
pub mod models;
pub mod services;

// Re-exportar tipos principales
pub use db::connection::{DatabaseConnection, DbConfig};
pub use db::{GraphStore, InMemoryGraphStore, StoreError, SurrealGraphStore};
pub use models::{
    AttributeValue, ConsistencyStats, DatasetKind, NodeRecord, RelationshipRecord, StagedFile,
    ValidationError, ValidationResult,
};
pub use services::config::{IngestConfig, StoreBackend};
pub use services::pipeline::{IngestionPipeline, IngestionReport, IngestionRequest, LoadSummary};
