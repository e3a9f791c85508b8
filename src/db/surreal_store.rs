//! SurrealDB-backed graph store.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::connection::{check_connection, DatabaseConnection};
use super::schema::initialize_schema;
use super::store::{GraphStore, StoreError};
use crate::models::{NodeRecord, RelationshipRecord};

/// Upsert keyed on the node id so a re-submitted dataset does not violate
/// the unique index
const NODE_BATCH_QUERY: &str = r#"
    BEGIN TRANSACTION;
    FOR $row IN $rows {
        UPDATE type::thing("address", $row.id) CONTENT {
            address_id: $row.id,
            properties: $row.properties,
            loaded_at: time::now()
        };
    };
    COMMIT TRANSACTION;
"#;

const RELATIONSHIP_BATCH_QUERY: &str = r#"
    BEGIN TRANSACTION;
    FOR $row IN $rows {
        LET $from = type::thing("address", $row.source);
        LET $to = type::thing("address", $row.target);
        RELATE $from->transfer->$to CONTENT {
            rel_type: $row.rel_type,
            properties: $row.properties,
            loaded_at: time::now()
        };
    };
    COMMIT TRANSACTION;
"#;

#[derive(Debug, Serialize)]
struct NodeRow {
    id: String,
    properties: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct RelationshipRow {
    source: String,
    target: String,
    rel_type: String,
    properties: Map<String, Value>,
}

/// Graph store writing address records and `transfer` edges
#[derive(Clone)]
pub struct SurrealGraphStore {
    db: DatabaseConnection,
}

impl SurrealGraphStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn run_batch<T: Serialize>(&self, query: &str, rows: Vec<T>) -> Result<(), StoreError> {
        let count = rows.len();

        self.db
            .query(query)
            .bind(("rows", rows))
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))?
            .check()
            .map_err(|e| StoreError::Commit(e.to_string()))?;

        debug!("Committed batch of {} rows", count);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        initialize_schema(&self.db)
            .await
            .map_err(|e| StoreError::Schema(format!("{:#}", e)))
    }

    async fn commit_node_batch(&self, rows: &[NodeRecord]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let rows = rows
            .iter()
            .map(|node| NodeRow {
                id: node.id.clone(),
                properties: node.properties(),
            })
            .collect();

        self.run_batch::<NodeRow>(NODE_BATCH_QUERY, rows).await
    }

    async fn commit_relationship_batch(&self, rows: &[RelationshipRecord]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let rows = rows
            .iter()
            .map(|rel| RelationshipRow {
                source: rel.source_id.clone(),
                target: rel.target_id.clone(),
                rel_type: rel.rel_type.clone(),
                properties: rel.properties(),
            })
            .collect();

        self.run_batch::<RelationshipRow>(RELATIONSHIP_BATCH_QUERY, rows)
            .await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(check_connection(&self.db).await)
    }

    fn backend_name(&self) -> &str {
        "surrealdb"
    }
}
