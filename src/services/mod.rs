//! Ingestion services.
//!
//! - **Storage**: request-scoped staging of uploads on disk
//! - **Validation**: structural and cross-file consistency checks
//! - **Loader**: batched commits into the graph store
//! - **Pipeline**: the state machine tying the stages together
//! - **Configuration**: service-level settings
//!
//! ```ignore
//! use chaingraph::services::pipeline::{IngestionPipeline, IngestionRequest};
//!
//! let pipeline = IngestionPipeline::new(stager, store, config.batch_size);
//! let report = pipeline.run(IngestionRequest::new(area, nodes, relationships)).await?;
//! ```

pub mod config;
pub mod loader;
pub mod pipeline;
pub mod storage;
pub mod validation;

// Re-exports
pub use config::{IngestConfig, StoreBackend};
pub use loader::{BulkLoader, LoadError, LoadProgress};
pub use pipeline::{
    IngestionPipeline, IngestionReport, IngestionRequest, LoadSummary, PipelineFailure,
    PipelineState,
};
pub use storage::{FileStager, StagingArea, StagingError};
pub use validation::{validate_consistency, validate_pair, validate_structure, ScanError};
