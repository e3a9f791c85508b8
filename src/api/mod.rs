//! HTTP API built with Axum:
//! - `/health` - Health check with store status
//! - `/v1/ingest` - Multipart upload of a node file and a relationship file

pub mod error;
pub mod handlers;
pub mod routes;
pub mod types;

// Re-exports
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AppState, SharedState};
pub use routes::{create_router, print_routes};
pub use types::*;
