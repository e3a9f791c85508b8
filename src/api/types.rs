//! API request/response types.

use serde::{Deserialize, Serialize};

use crate::models::ConsistencyStats;
use crate::services::pipeline::{IngestionReport, LoadSummary};

/// Response of a successful ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub request_id: String,
    pub stats: ConsistencyStats,
    pub loaded: LoadSummary,
    pub processing_time_ms: u64,
}

impl IngestResponse {
    pub fn from_report(report: IngestionReport, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            request_id: report.request_id,
            stats: report.stats,
            loaded: report.loaded,
            processing_time_ms,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub store: StoreHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHealth {
    pub backend: String,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_response_wire_names() {
        let response = IngestResponse::from_report(
            IngestionReport {
                request_id: "ingest_abc".to_string(),
                stats: ConsistencyStats {
                    total_nodes: 3,
                    total_relationships: 2,
                    orphan_relationship_count: 0,
                    duplicate_node_count: 0,
                },
                loaded: LoadSummary {
                    nodes_loaded: 3,
                    relationships_loaded: 2,
                    batches: 2,
                },
            },
            12,
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["requestId"], "ingest_abc");
        assert_eq!(json["stats"]["totalNodes"], 3);
        assert_eq!(json["loaded"]["relationshipsLoaded"], 2);
        assert_eq!(json["processingTimeMs"], 12);
    }
}
