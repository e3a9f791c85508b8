//! Cross-file consistency validation.
//!
//! Two streaming passes: the node file builds the set of declared ids (and
//! counts duplicates), then the relationship file is checked against it.
//! Memory is bounded by the number of unique node ids, never by the size of
//! the relationship file.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::models::{
    ConsistencyStats, NodeRecord, RelationshipRecord, StagedFile, ValidationError,
    ValidationResult,
};

use super::reader::DatasetReader;
use super::ScanError;

/// Checks that node ids are unique and every relationship endpoint resolves
/// to a node declared in `nodes`.
///
/// Both files must already have passed structural validation. The returned
/// result always carries stats, valid or not.
pub async fn validate_consistency(
    nodes: &StagedFile,
    relationships: &StagedFile,
) -> Result<ValidationResult, ScanError> {
    let nodes_path = nodes.path.clone();
    let relationships_path = relationships.path.clone();

    let result = tokio::task::spawn_blocking(move || check(&nodes_path, &relationships_path))
        .await??;

    if let Some(stats) = result.stats() {
        info!(
            "Consistency validation: nodes={}, relationships={}, orphans={}, duplicates={}",
            stats.total_nodes,
            stats.total_relationships,
            stats.orphan_relationship_count,
            stats.duplicate_node_count
        );
    }

    Ok(result)
}

fn check(nodes_path: &Path, relationships_path: &Path) -> Result<ValidationResult, ScanError> {
    let mut stats = ConsistencyStats::default();
    let mut errors = Vec::new();

    // Pass 1: declared ids, with the row each was first seen on
    let mut declared: HashMap<String, u64> = HashMap::new();
    let reader = DatasetReader::<NodeRecord>::open(nodes_path)
        .map_err(|e| ScanError::from_reader(nodes_path, e))?;

    for row in reader {
        let row = row.map_err(|e| ScanError::from_reader(nodes_path, e))?;
        let Ok(node) = row.parsed else {
            continue;
        };

        stats.total_nodes += 1;
        match declared.entry(node.id) {
            Entry::Occupied(first) => {
                stats.duplicate_node_count += 1;
                errors.push(
                    ValidationError::at_row(
                        row.number,
                        Some("id"),
                        format!(
                            "duplicate node id '{}' (first declared on row {})",
                            first.key(),
                            first.get()
                        ),
                    )
                    .with_line(row.line),
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(row.number);
            }
        }
    }

    debug!("Collected {} unique node ids", declared.len());

    // Pass 2: every endpoint must be declared
    let reader = DatasetReader::<RelationshipRecord>::open(relationships_path)
        .map_err(|e| ScanError::from_reader(relationships_path, e))?;

    for row in reader {
        let row = row.map_err(|e| ScanError::from_reader(relationships_path, e))?;
        let Ok(rel) = row.parsed else {
            continue;
        };

        stats.total_relationships += 1;
        let mut orphaned = false;

        for (field, id) in [("source", &rel.source_id), ("target", &rel.target_id)] {
            if !declared.contains_key(id) {
                orphaned = true;
                errors.push(
                    ValidationError::at_row(row.number, Some(field), format!("unknown node id '{}'", id))
                        .with_line(row.line),
                );
            }
        }

        if orphaned {
            stats.orphan_relationship_count += 1;
        }
    }

    Ok(ValidationResult::with_stats(errors, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged(dir: &TempDir, name: &str, content: &str) -> StagedFile {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        StagedFile {
            path,
            original_name: name.to_string(),
            size_bytes: content.len() as u64,
            declared_mime_type: None,
            checksum: String::new(),
        }
    }

    #[tokio::test]
    async fn test_closed_dataset_is_consistent() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id,label\nA1,wallet\nA2,wallet\nA3,exchange\n");
        let rels = staged(
            &dir,
            "rels.csv",
            "source,target,type\nA1,A2,transfer\nA2,A3,transfer\nA3,A1,transfer\n",
        );

        let result = validate_consistency(&nodes, &rels).await.unwrap();
        assert!(result.is_valid());

        let stats = result.stats().unwrap();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_relationships, 3);
        assert_eq!(stats.orphan_relationship_count, 0);
        assert_eq!(stats.duplicate_node_count, 0);
    }

    #[tokio::test]
    async fn test_orphan_reference_is_reported_with_row() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id,label\nA1,wallet\nA2,wallet\n");
        let rels = staged(
            &dir,
            "rels.csv",
            "source,target,type\nA1,A2,transfer\nA1,A3,transfer\n",
        );

        let result = validate_consistency(&nodes, &rels).await.unwrap();
        assert!(!result.is_valid());
        assert_eq!(
            result.stats(),
            Some(&ConsistencyStats {
                total_nodes: 2,
                total_relationships: 2,
                orphan_relationship_count: 1,
                duplicate_node_count: 0,
            })
        );

        assert_eq!(result.errors().len(), 1);
        let error = &result.errors()[0];
        assert_eq!(error.row, Some(2));
        assert_eq!(error.field.as_deref(), Some("target"));
        assert!(error.reason.contains("A3"));
    }

    #[tokio::test]
    async fn test_orphan_error_carries_physical_line() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id\nA1\nA2\n");
        let rels = staged(
            &dir,
            "rels.csv",
            "source,target,type\n\nA1,A2,transfer\n\nA2,A9,transfer\n",
        );

        let result = validate_consistency(&nodes, &rels).await.unwrap();

        let error = &result.errors()[0];
        assert_eq!(error.row, Some(2));
        assert_eq!(error.line, Some(5));
    }

    #[tokio::test]
    async fn test_both_endpoints_missing_counts_one_orphan() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id\nA1\n");
        let rels = staged(&dir, "rels.csv", "source,target,type\nX1,X2,transfer\n");

        let result = validate_consistency(&nodes, &rels).await.unwrap();
        assert_eq!(result.stats().unwrap().orphan_relationship_count, 1);
        assert_eq!(result.errors().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_invalid_even_if_unreferenced() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id,label\nA1,wallet\nA2,wallet\nA2,exchange\n");
        let rels = staged(&dir, "rels.csv", "source,target,type\n");

        let result = validate_consistency(&nodes, &rels).await.unwrap();
        assert!(!result.is_valid());

        let stats = result.stats().unwrap();
        assert_eq!(stats.duplicate_node_count, 1);
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(result.errors()[0].row, Some(3));
        assert!(result.errors()[0].reason.contains("row 2"));
    }

    #[tokio::test]
    async fn test_ids_are_compared_after_trimming() {
        let dir = TempDir::new().unwrap();
        let nodes = staged(&dir, "nodes.csv", "id\n A1 \nA2\n");
        let rels = staged(&dir, "rels.csv", "source,target,type\nA1, A2,transfer\n");

        let result = validate_consistency(&nodes, &rels).await.unwrap();
        assert!(result.is_valid());
    }
}
