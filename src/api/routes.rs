//! API route definitions.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::handlers::{self, SharedState};

/// Multipart framing allowance on top of the two file payloads
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Creates the API router with all routes configured
pub fn create_router(state: SharedState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // API v1 routes
        .nest("/v1", api_v1_routes(body_limit))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(body_limit: u64) -> Router<SharedState> {
    Router::new()
        // Dataset ingestion (multipart: nodes + relationships)
        .route("/ingest", post(handlers::ingest))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
}

/// Prints all available routes for logging
pub fn print_routes() {
    tracing::info!("Available API routes:");
    tracing::info!("  GET  /health     - Health check with store status");
    tracing::info!("  POST /v1/ingest  - Ingest nodes + relationships CSV (multipart)");
}
