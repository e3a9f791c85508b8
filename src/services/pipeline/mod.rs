//! Ingestion pipeline orchestrator.
//!
//! An explicit state machine driving one request from staged files to a
//! loaded graph:
//!
//! ```text
//! Staging -> StructuralValidating -> ConsistencyValidating
//!         -> SchemaInitializing -> LoadingNodes -> LoadingRelationships -> Done
//! ```
//!
//! Any state may move to `Failed`. Nothing is written to the store before
//! both validation states have passed, and relationships are never loaded
//! before every node batch is committed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{GraphStore, StoreError};
use crate::models::{ConsistencyStats, StagedFile, ValidationResult};
use crate::services::loader::{BulkLoader, LoadError, LoadProgress};
use crate::services::storage::{FileStager, StagingArea, StagingError};
use crate::services::validation::{validate_consistency, validate_pair, ScanError};

/// One ingestion request: both files staged in the request's own area.
///
/// Can only be built once both files are fully written. Dropping it removes
/// the staged files.
#[derive(Debug)]
pub struct IngestionRequest {
    area: StagingArea,
    nodes: StagedFile,
    relationships: StagedFile,
}

impl IngestionRequest {
    pub fn new(area: StagingArea, nodes: StagedFile, relationships: StagedFile) -> Self {
        Self {
            area,
            nodes,
            relationships,
        }
    }

    pub fn request_id(&self) -> &str {
        self.area.request_id()
    }

    pub fn nodes(&self) -> &StagedFile {
        &self.nodes
    }

    pub fn relationships(&self) -> &StagedFile {
        &self.relationships
    }
}

/// Rows committed by a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub nodes_loaded: u64,
    pub relationships_loaded: u64,
    pub batches: u64,
}

/// Outcome of a run that reached `Done`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub request_id: String,
    pub stats: ConsistencyStats,
    pub loaded: LoadSummary,
}

/// Why a run ended in `Failed`
#[derive(Error, Debug)]
pub enum PipelineFailure {
    #[error("CSV validation failed")]
    Structural {
        nodes: ValidationResult,
        relationships: ValidationResult,
    },

    #[error("Data consistency validation failed")]
    Consistency(ValidationResult),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Failed to read staged files: {0}")]
    Scan(#[from] ScanError),

    #[error("Schema initialization failed: {0}")]
    Schema(StoreError),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),
}

impl PipelineFailure {
    /// Whether the failure is the caller's data rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineFailure::Structural { .. } | PipelineFailure::Consistency(_)
        )
    }
}

/// Pipeline states. Each carries what later states need.
#[derive(Debug)]
pub enum PipelineState {
    Staging,
    StructuralValidating,
    ConsistencyValidating,
    SchemaInitializing {
        stats: ConsistencyStats,
    },
    LoadingNodes {
        stats: ConsistencyStats,
    },
    LoadingRelationships {
        stats: ConsistencyStats,
        nodes: LoadProgress,
    },
    Done(IngestionReport),
    Failed(PipelineFailure),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Staging => "staging",
            PipelineState::StructuralValidating => "structural_validating",
            PipelineState::ConsistencyValidating => "consistency_validating",
            PipelineState::SchemaInitializing { .. } => "schema_initializing",
            PipelineState::LoadingNodes { .. } => "loading_nodes",
            PipelineState::LoadingRelationships { .. } => "loading_relationships",
            PipelineState::Done(_) => "done",
            PipelineState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done(_) | PipelineState::Failed(_))
    }
}

/// Runs ingestion requests against a graph store.
///
/// Holds no per-request state; concurrent runs share only the store handle.
#[derive(Clone)]
pub struct IngestionPipeline {
    stager: FileStager,
    store: Arc<dyn GraphStore>,
    loader: BulkLoader,
}

impl IngestionPipeline {
    pub fn new(stager: FileStager, store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        let loader = BulkLoader::new(store.clone(), batch_size);
        Self {
            stager,
            store,
            loader,
        }
    }

    pub fn stager(&self) -> &FileStager {
        &self.stager
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Runs the request to a terminal state and removes its staging area
    pub async fn run(&self, request: IngestionRequest) -> Result<IngestionReport, PipelineFailure> {
        let request_id = request.request_id().to_string();
        let mut state = PipelineState::Staging;

        info!("[{}] Ingestion started", request_id);

        let outcome = loop {
            state = match state {
                PipelineState::Done(report) => break Ok(report),
                PipelineState::Failed(failure) => break Err(failure),
                current => {
                    let from = current.name();
                    let next = self.step(&request, current).await;
                    info!("[{}] {} -> {}", request_id, from, next.name());
                    next
                }
            };
        };

        if let Err(e) = request.area.close() {
            warn!("[{}] Failed to remove staging area: {}", request_id, e);
        }

        match &outcome {
            Ok(report) => info!(
                "[{}] Ingestion complete: {} nodes, {} relationships in {} batches",
                request_id,
                report.loaded.nodes_loaded,
                report.loaded.relationships_loaded,
                report.loaded.batches
            ),
            Err(failure) if failure.is_client_error() => {
                info!("[{}] Ingestion rejected: {}", request_id, failure)
            }
            Err(failure) => error!("[{}] Ingestion failed: {}", request_id, failure),
        }

        outcome
    }

    /// Performs one transition
    pub async fn step(&self, request: &IngestionRequest, state: PipelineState) -> PipelineState {
        match state {
            PipelineState::Staging => {
                let verified = async {
                    self.stager.verify(&request.nodes).await?;
                    self.stager.verify(&request.relationships).await
                };
                match verified.await {
                    Ok(()) => PipelineState::StructuralValidating,
                    Err(e) => PipelineState::Failed(e.into()),
                }
            }

            PipelineState::StructuralValidating => {
                match validate_pair(&request.nodes, &request.relationships).await {
                    Ok((nodes, relationships)) if nodes.is_valid() && relationships.is_valid() => {
                        PipelineState::ConsistencyValidating
                    }
                    Ok((nodes, relationships)) => PipelineState::Failed(PipelineFailure::Structural {
                        nodes,
                        relationships,
                    }),
                    Err(e) => PipelineState::Failed(e.into()),
                }
            }

            PipelineState::ConsistencyValidating => {
                match validate_consistency(&request.nodes, &request.relationships).await {
                    Ok(result) if result.is_valid() => PipelineState::SchemaInitializing {
                        stats: result.stats().copied().unwrap_or_default(),
                    },
                    Ok(result) => PipelineState::Failed(PipelineFailure::Consistency(result)),
                    Err(e) => PipelineState::Failed(e.into()),
                }
            }

            PipelineState::SchemaInitializing { stats } => match self.store.ensure_schema().await {
                Ok(()) => PipelineState::LoadingNodes { stats },
                Err(e) => PipelineState::Failed(PipelineFailure::Schema(e)),
            },

            PipelineState::LoadingNodes { stats } => {
                match self.loader.load_nodes(&request.nodes).await {
                    Ok(nodes) => PipelineState::LoadingRelationships { stats, nodes },
                    Err(e) => PipelineState::Failed(e.into()),
                }
            }

            PipelineState::LoadingRelationships { stats, nodes } => {
                match self.loader.load_relationships(&request.relationships).await {
                    Ok(relationships) => PipelineState::Done(IngestionReport {
                        request_id: request.request_id().to_string(),
                        stats,
                        loaded: LoadSummary {
                            nodes_loaded: nodes.rows,
                            relationships_loaded: relationships.rows,
                            batches: nodes.batches + relationships.batches,
                        },
                    }),
                    Err(e) => PipelineState::Failed(e.into()),
                }
            }

            terminal @ (PipelineState::Done(_) | PipelineState::Failed(_)) => terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryGraphStore;
    use crate::models::DatasetKind;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        stager: FileStager,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let stager = FileStager::new(dir.path().join("scratch"), 1024 * 1024);
            stager.init().await.unwrap();
            Self { _dir: dir, stager }
        }

        async fn request(&self, nodes: &str, relationships: &str) -> IngestionRequest {
            let area = self.stager.open_area().unwrap();
            let nodes = self
                .stager
                .stage(&area, DatasetKind::Nodes, body(nodes), Some("nodes.csv"), None)
                .await
                .unwrap();
            let relationships = self
                .stager
                .stage(
                    &area,
                    DatasetKind::Relationships,
                    body(relationships),
                    Some("relationships.csv"),
                    None,
                )
                .await
                .unwrap();
            IngestionRequest::new(area, nodes, relationships)
        }

        fn pipeline(&self, store: Arc<InMemoryGraphStore>, batch_size: usize) -> IngestionPipeline {
            IngestionPipeline::new(self.stager.clone(), store, batch_size)
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.stager.root()).unwrap().next().is_none()
        }
    }

    fn body(content: &str) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(vec![Ok(Bytes::from(content.to_string()))])
    }

    const NODES: &str = "id,label\nA1,wallet\nA2,wallet\nA3,exchange\n";
    const RELATIONSHIPS: &str =
        "source,target,type,amount\nA1,A2,transfer,5\nA2,A3,transfer,1.25\nA3,A1,transfer,0\n";

    #[tokio::test]
    async fn test_run_loads_closed_dataset() {
        let fixture = Fixture::new().await;
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = fixture.pipeline(store.clone(), 2);

        let request = fixture.request(NODES, RELATIONSHIPS).await;
        let request_id = request.request_id().to_string();
        let report = pipeline.run(request).await.unwrap();

        assert_eq!(report.request_id, request_id);
        assert_eq!(report.stats.total_nodes, 3);
        assert_eq!(report.stats.total_relationships, 3);
        assert_eq!(
            report.loaded,
            LoadSummary {
                nodes_loaded: 3,
                relationships_loaded: 3,
                batches: 4,
            }
        );
        assert_eq!(store.node_count().await, 3);
        assert_eq!(store.relationship_count().await, 3);
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_orphan_leaves_store_untouched() {
        let fixture = Fixture::new().await;
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = fixture.pipeline(store.clone(), 1000);

        let request = fixture
            .request(
                "id,label\nA1,wallet\nA2,wallet\n",
                "source,target,type\nA1,A2,transfer\nA1,A3,transfer\n",
            )
            .await;

        match pipeline.run(request).await {
            Err(PipelineFailure::Consistency(result)) => {
                assert_eq!(result.errors()[0].row, Some(2));
                assert_eq!(result.stats().unwrap().orphan_relationship_count, 1);
            }
            other => panic!("expected consistency failure, got {:?}", other),
        }

        assert!(store.schema_snapshot().await.is_empty());
        assert_eq!(store.node_batches_seen(), 0);
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_structural_failure_reports_both_files() {
        let fixture = Fixture::new().await;
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = fixture.pipeline(store.clone(), 1000);

        let request = fixture
            .request("id,balance\nA1,-3\n", "source;target;type\nA1;A1;self\n")
            .await;

        match pipeline.run(request).await {
            Err(PipelineFailure::Structural {
                nodes,
                relationships,
            }) => {
                assert_eq!(nodes.errors().len(), 1);
                assert_eq!(relationships.errors().len(), 1);
            }
            other => panic!("expected structural failure, got {:?}", other),
        }
        assert_eq!(store.node_batches_seen(), 0);
    }

    #[tokio::test]
    async fn test_consistency_not_run_after_structural_failure() {
        let fixture = Fixture::new().await;
        let pipeline = fixture.pipeline(Arc::new(InMemoryGraphStore::new()), 1000);

        // structurally broken and orphaned at once
        let request = fixture
            .request("id\nA1\n", "source,target,type\nA1,,transfer\nA1,A9,transfer\n")
            .await;

        let failure = pipeline.run(request).await.unwrap_err();
        assert!(matches!(failure, PipelineFailure::Structural { .. }));
        assert!(failure.is_client_error());
    }

    #[tokio::test]
    async fn test_relationship_batch_failure_after_partial_commit() {
        let fixture = Fixture::new().await;
        let store = Arc::new(InMemoryGraphStore::new().failing_relationship_batch(1));
        let pipeline = fixture.pipeline(store.clone(), 2);

        let request = fixture.request(NODES, RELATIONSHIPS).await;
        let failure = pipeline.run(request).await.unwrap_err();

        match &failure {
            PipelineFailure::Load(LoadError::Store(err)) => {
                assert_eq!(err.committed_rows(), 2);
                assert_eq!(err.last_committed_batch(), Some(0));
            }
            other => panic!("expected load failure, got {:?}", other),
        }
        assert!(!failure.is_client_error());
        assert_eq!(store.node_count().await, 3);
        assert_eq!(store.relationship_count().await, 2);
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_schema_failure_stops_before_loading() {
        let fixture = Fixture::new().await;
        let store = Arc::new(InMemoryGraphStore::new().with_schema_failure());
        let pipeline = fixture.pipeline(store.clone(), 1000);

        let request = fixture.request(NODES, RELATIONSHIPS).await;
        let failure = pipeline.run(request).await.unwrap_err();

        assert!(matches!(failure, PipelineFailure::Schema(_)));
        assert_eq!(store.node_batches_seen(), 0);
    }

    #[tokio::test]
    async fn test_step_walks_states_in_order() {
        let fixture = Fixture::new().await;
        let pipeline = fixture.pipeline(Arc::new(InMemoryGraphStore::new()), 1000);
        let request = fixture.request(NODES, RELATIONSHIPS).await;

        let mut state = PipelineState::Staging;
        let mut seen = vec![state.name()];
        while !state.is_terminal() {
            state = pipeline.step(&request, state).await;
            seen.push(state.name());
        }

        assert_eq!(
            seen,
            vec![
                "staging",
                "structural_validating",
                "consistency_validating",
                "schema_initializing",
                "loading_nodes",
                "loading_relationships",
                "done",
            ]
        );
    }

    #[tokio::test]
    async fn test_staging_detects_truncated_file() {
        let fixture = Fixture::new().await;
        let pipeline = fixture.pipeline(Arc::new(InMemoryGraphStore::new()), 1000);
        let request = fixture.request(NODES, RELATIONSHIPS).await;

        std::fs::write(&request.nodes().path, "id\n").unwrap();

        let state = pipeline.step(&request, PipelineState::Staging).await;
        assert!(matches!(
            state,
            PipelineState::Failed(PipelineFailure::Staging(StagingError::SizeMismatch { .. }))
        ));
    }
}
