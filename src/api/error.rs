//! API error handling module.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::{ConsistencyStats, DatasetKind, ValidationError};
use crate::services::loader::LoadError;
use crate::services::pipeline::PipelineFailure;
use crate::services::storage::StagingError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing required files: {}", list_kinds(.0))]
    MissingFiles(Vec<DatasetKind>),

    #[error("Upload exceeds maximum allowed {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// The multipart body could not be read; `status` comes from the
    /// multipart layer (413 once the request body limit is hit)
    #[error("{message}")]
    Upload { status: StatusCode, message: String },

    #[error("CSV validation failed")]
    CsvValidation {
        nodes_errors: Vec<ValidationError>,
        relationships_errors: Vec<ValidationError>,
    },

    #[error("Data consistency validation failed")]
    Consistency {
        details: Vec<ValidationError>,
        stats: ConsistencyStats,
    },

    #[error("Failed to stage uploaded files")]
    Staging(String),

    #[error("Failed to load data into the graph store")]
    Store {
        detail: String,
        committed_rows: Option<u64>,
        last_committed_batch: Option<u64>,
    },

    #[error("Internal server error")]
    InternalError(String),
}

fn list_kinds(kinds: &[DatasetKind]) -> String {
    kinds
        .iter()
        .map(|k| k.field_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error response body
#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_errors: Option<Vec<ValidationError>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships_errors: Option<Vec<ValidationError>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationError>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ConsistencyStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_committed_batch: Option<u64>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::MissingFiles(_)
            | ApiError::CsvValidation { .. }
            | ApiError::Consistency { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload { status, .. } => *status,
            ApiError::Staging(_) | ApiError::Store { .. } | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::MissingFiles(_) => "MISSING_FILES",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::Upload { status, .. } => match *status {
                StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
                s if s.is_server_error() => "INTERNAL_ERROR",
                _ => "BAD_REQUEST",
            },
            ApiError::CsvValidation { .. } => "CSV_VALIDATION_FAILED",
            ApiError::Consistency { .. } => "CONSISTENCY_VALIDATION_FAILED",
            ApiError::Staging(_) => "STAGING_ERROR",
            ApiError::Store { .. } => "STORE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
            ..Default::default()
        };

        match self {
            ApiError::CsvValidation {
                nodes_errors,
                relationships_errors,
            } => {
                body.nodes_errors = Some(nodes_errors);
                body.relationships_errors = Some(relationships_errors);
            }
            ApiError::Consistency { details, stats } => {
                body.details = Some(details);
                body.stats = Some(stats);
            }
            ApiError::Store {
                detail,
                committed_rows,
                last_committed_batch,
            } => {
                error!("Store failure: {}", detail);
                body.committed_rows = committed_rows;
                body.last_committed_batch = last_committed_batch;
            }
            ApiError::Staging(detail) | ApiError::InternalError(detail) => {
                error!("Request failed: {}", detail);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<PipelineFailure> for ApiError {
    fn from(failure: PipelineFailure) -> Self {
        match failure {
            PipelineFailure::Structural {
                nodes,
                relationships,
            } => ApiError::CsvValidation {
                nodes_errors: nodes.into_errors(),
                relationships_errors: relationships.into_errors(),
            },
            PipelineFailure::Consistency(result) => {
                let stats = result.stats().copied().unwrap_or_default();
                ApiError::Consistency {
                    details: result.into_errors(),
                    stats,
                }
            }
            PipelineFailure::Staging(e) => e.into(),
            PipelineFailure::Scan(e) => ApiError::Staging(e.to_string()),
            PipelineFailure::Schema(e) => ApiError::Store {
                detail: e.to_string(),
                committed_rows: None,
                last_committed_batch: None,
            },
            PipelineFailure::Load(LoadError::Store(e)) => ApiError::Store {
                detail: e.to_string(),
                committed_rows: Some(e.committed_rows()),
                last_committed_batch: e.last_committed_batch(),
            },
            PipelineFailure::Load(e) => ApiError::Store {
                detail: e.to_string(),
                committed_rows: Some(e.committed_rows()),
                last_committed_batch: None,
            },
        }
    }
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::TooLarge { limit, .. } => ApiError::PayloadTooLarge { limit },
            StagingError::Interrupted { name, source } => {
                let status = source
                    .downcast_ref::<MultipartError>()
                    .map_or(StatusCode::BAD_REQUEST, MultipartError::status);
                ApiError::Upload {
                    status,
                    message: format!("Upload of '{}' was interrupted: {}", name, source),
                }
            }
            other => ApiError::Staging(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{:#}", err))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload {
            status: err.status(),
            message: format!("Multipart parse error: {}", err.body_text()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::models::ValidationResult;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_missing_files_names_each_part() {
        let err = ApiError::MissingFiles(vec![DatasetKind::Nodes, DatasetKind::Relationships]);
        assert_eq!(err.to_string(), "Missing required files: nodes, relationships");

        let err = ApiError::MissingFiles(vec![DatasetKind::Relationships]);
        assert_eq!(err.to_string(), "Missing required files: relationships");
    }

    #[tokio::test]
    async fn test_consistency_body() {
        let failure = PipelineFailure::Consistency(ValidationResult::with_stats(
            vec![ValidationError::at_row(2, Some("target"), "unknown node id 'A3'")],
            ConsistencyStats {
                total_nodes: 2,
                total_relationships: 2,
                orphan_relationship_count: 1,
                duplicate_node_count: 0,
            },
        ));

        let (status, json) = body_json(failure.into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Data consistency validation failed");
        assert_eq!(json["details"][0]["row"], 2);
        assert_eq!(json["stats"]["orphanRelationshipCount"], 1);
        assert!(json.get("nodesErrors").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_generic() {
        let failure = PipelineFailure::Load(LoadError::Store(StoreError::PartialLoad {
            kind: DatasetKind::Nodes,
            failed_batch: 1,
            committed_rows: 1000,
            reason: "secret connection string".to_string(),
        }));

        let (status, json) = body_json(failure.into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to load data into the graph store");
        assert_eq!(json["committedRows"], 1000);
        assert_eq!(json["lastCommittedBatch"], 0);
        assert!(!json.to_string().contains("secret"));
    }

    #[test]
    fn test_too_large_maps_to_413() {
        let err: ApiError = StagingError::TooLarge {
            name: "nodes.csv".to_string(),
            limit: 10,
        }
        .into();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_interrupted_upload_without_multipart_source_is_400() {
        let err: ApiError = StagingError::Interrupted {
            name: "nodes.csv".to_string(),
            source: Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        }
        .into();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "BAD_REQUEST");
        assert!(err.to_string().contains("nodes.csv"));
    }

    #[tokio::test]
    async fn test_upload_error_keeps_multipart_status() {
        let err = ApiError::Upload {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "Multipart parse error: length limit exceeded".to_string(),
        };

        let (status, json) = body_json(err).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(json["success"], false);
    }
}
