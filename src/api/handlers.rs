//! API request handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::{debug, info, warn};

use crate::models::{DatasetKind, StagedFile};
use crate::services::config::IngestConfig;
use crate::services::pipeline::{IngestionPipeline, IngestionRequest};

use super::error::{ApiError, ApiResult};
use super::types::*;

/// Application state shared across handlers. Immutable after startup.
pub struct AppState {
    pub config: IngestConfig,
    pub pipeline: IngestionPipeline,
}

/// Shared state handle
pub type SharedState = Arc<AppState>;

// ============================================================================
// Health Check Handler
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let store = state.pipeline.store();
    let healthy = match store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!("Store health check failed: {}", e);
            false
        }
    };

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        service: "chaingraph".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: StoreHealth {
            backend: store.backend_name().to_string(),
            healthy,
        },
    })
}

// ============================================================================
// Ingest Handler
// ============================================================================

/// Ingests a node file and a relationship file (multipart parts `nodes` and
/// `relationships`) into the graph store.
///
/// Parts are streamed straight to the request's staging area. The pipeline
/// only runs once both parts are fully staged.
pub async fn ingest(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<IngestResponse>> {
    let start = Instant::now();
    let stager = state.pipeline.stager();
    let area = stager.open_area()?;

    let mut nodes: Option<StagedFile> = None;
    let mut relationships: Option<StagedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(kind) = field.name().and_then(DatasetKind::from_field_name) else {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        };

        let slot = match kind {
            DatasetKind::Nodes => &mut nodes,
            DatasetKind::Relationships => &mut relationships,
        };
        if slot.is_some() {
            return Err(ApiError::BadRequest(format!(
                "File part '{}' was sent more than once",
                kind
            )));
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let staged = stager
            .stage(
                &area,
                kind,
                Box::pin(field),
                file_name.as_deref(),
                content_type.as_deref(),
            )
            .await?;
        *slot = Some(staged);
    }

    let (nodes, relationships) = match (nodes, relationships) {
        (Some(nodes), Some(relationships)) => (nodes, relationships),
        (nodes, relationships) => {
            let mut missing = Vec::new();
            if nodes.is_none() {
                missing.push(DatasetKind::Nodes);
            }
            if relationships.is_none() {
                missing.push(DatasetKind::Relationships);
            }

            info!(
                "[{}] Rejecting upload, missing parts: {:?}",
                area.request_id(),
                missing
            );
            if let Err(e) = area.close() {
                warn!("Failed to remove staging area: {}", e);
            }
            return Err(ApiError::MissingFiles(missing));
        }
    };

    let request = IngestionRequest::new(area, nodes, relationships);
    let report = state.pipeline.run(request).await?;

    Ok(Json(IngestResponse::from_report(
        report,
        start.elapsed().as_millis() as u64,
    )))
}
