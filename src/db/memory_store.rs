//! In-memory graph store for local runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::store::{GraphStore, StoreError};
use crate::models::{NodeRecord, RelationshipRecord};

const SCHEMA_DEFINITIONS: &[&str] = &[
    "table address",
    "unique index address.address_id",
    "table transfer",
    "index transfer.in",
    "index transfer.out",
    "index transfer.rel_type",
];

/// A stored relationship
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Default)]
struct GraphState {
    schema: BTreeSet<String>,
    nodes: BTreeMap<String, Map<String, Value>>,
    relationships: Vec<StoredRelationship>,
}

/// Graph store held in process memory.
///
/// Node commits upsert by id. Relationship commits require both endpoints
/// to exist. A batch is validated in full before any of it is applied.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    node_calls: AtomicU64,
    relationship_calls: AtomicU64,
    fail_schema: bool,
    fail_node_batch: Option<u64>,
    fail_relationship_batch: Option<u64>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ensure_schema` fail
    pub fn with_schema_failure(mut self) -> Self {
        self.fail_schema = true;
        self
    }

    /// Makes the node batch with this zero-based call index fail
    pub fn failing_node_batch(mut self, index: u64) -> Self {
        self.fail_node_batch = Some(index);
        self
    }

    /// Makes the relationship batch with this zero-based call index fail
    pub fn failing_relationship_batch(mut self, index: u64) -> Self {
        self.fail_relationship_batch = Some(index);
        self
    }

    /// Sorted list of defined schema objects
    pub async fn schema_snapshot(&self) -> Vec<String> {
        self.state.read().await.schema.iter().cloned().collect()
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.state.read().await.relationships.len()
    }

    pub async fn node(&self, id: &str) -> Option<Map<String, Value>> {
        self.state.read().await.nodes.get(id).cloned()
    }

    pub async fn relationships(&self) -> Vec<StoredRelationship> {
        self.state.read().await.relationships.clone()
    }

    /// Number of node batches submitted, failed ones included
    pub fn node_batches_seen(&self) -> u64 {
        self.node_calls.load(Ordering::SeqCst)
    }

    /// Number of relationship batches submitted, failed ones included
    pub fn relationship_batches_seen(&self) -> u64 {
        self.relationship_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        if self.fail_schema {
            return Err(StoreError::Schema("schema definition rejected".to_string()));
        }

        let mut state = self.state.write().await;
        state
            .schema
            .extend(SCHEMA_DEFINITIONS.iter().map(|d| d.to_string()));
        Ok(())
    }

    async fn commit_node_batch(&self, rows: &[NodeRecord]) -> Result<(), StoreError> {
        let call = self.node_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_node_batch == Some(call) {
            return Err(StoreError::Commit(format!("injected failure on node batch {}", call)));
        }

        let mut state = self.state.write().await;
        if state.schema.is_empty() {
            return Err(StoreError::Commit("table address is not defined".to_string()));
        }

        for node in rows {
            state.nodes.insert(node.id.clone(), node.properties());
        }
        Ok(())
    }

    async fn commit_relationship_batch(&self, rows: &[RelationshipRecord]) -> Result<(), StoreError> {
        let call = self.relationship_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_relationship_batch == Some(call) {
            return Err(StoreError::Commit(format!(
                "injected failure on relationship batch {}",
                call
            )));
        }

        let mut state = self.state.write().await;
        if state.schema.is_empty() {
            return Err(StoreError::Commit("table transfer is not defined".to_string()));
        }

        let missing = rows.iter().find_map(|rel| {
            [&rel.source_id, &rel.target_id]
                .into_iter()
                .find(|id| !state.nodes.contains_key(id.as_str()))
        });
        if let Some(id) = missing {
            return Err(StoreError::Commit(format!("endpoint address:{} does not exist", id)));
        }

        state
            .relationships
            .extend(rows.iter().map(|rel| StoredRelationship {
                source_id: rel.source_id.clone(),
                target_id: rel.target_id.clone(),
                rel_type: rel.rel_type.clone(),
                properties: rel.properties(),
            }));
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
