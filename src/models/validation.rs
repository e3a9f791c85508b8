//! Validation outcome types shared by the structural and consistency passes.

use serde::{Deserialize, Serialize};

/// A single problem found while scanning a CSV file.
///
/// Data rows are numbered from 1 (the header is row 0). File-level problems
/// such as an unreadable header carry no row.
///
/// `row` counts CSV records. Blank lines are skipped and a quoted cell may
/// span several lines, so `line` gives the physical line the record starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub row: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub reason: String,
}

impl ValidationError {
    /// Error attached to a data row
    pub fn at_row(row: u64, field: Option<&str>, reason: impl Into<String>) -> Self {
        debug_assert!(row >= 1, "data rows are numbered from 1");
        Self {
            row: Some(row),
            line: None,
            field: field.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Attaches the 1-based physical line the row starts on
    pub fn with_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    /// Error that concerns the file as a whole
    pub fn file_level(reason: impl Into<String>) -> Self {
        Self {
            row: None,
            line: None,
            field: None,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(row) = self.row else {
            return write!(f, "{}", self.reason);
        };

        write!(f, "row {}", row)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        match &self.field {
            Some(field) => write!(f, " [{}]: {}", field, self.reason),
            None => write!(f, ": {}", self.reason),
        }
    }
}

/// Dataset statistics compiled by the consistency pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyStats {
    pub total_nodes: u64,
    pub total_relationships: u64,
    pub orphan_relationship_count: u64,
    pub duplicate_node_count: u64,
}

impl ConsistencyStats {
    pub fn has_violations(&self) -> bool {
        self.orphan_relationship_count > 0 || self.duplicate_node_count > 0
    }
}

/// Result of a validation pass.
///
/// `is_valid` is derived from `errors` on construction and the fields are
/// private, so `is_valid == errors.is_empty()` cannot be broken afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    is_valid: bool,
    errors: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ConsistencyStats>,
}

impl ValidationResult {
    /// Builds a structural result (no stats)
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            stats: None,
        }
    }

    /// Builds a consistency result; stats are always attached
    pub fn with_stats(errors: Vec<ValidationError>, stats: ConsistencyStats) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            stats: Some(stats),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn stats(&self) -> Option<&ConsistencyStats> {
        self.stats.as_ref()
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_follows_errors() {
        let ok = ValidationResult::from_errors(Vec::new());
        assert!(ok.is_valid());

        let bad = ValidationResult::from_errors(vec![ValidationError::file_level("empty file")]);
        assert!(!bad.is_valid());
        assert_eq!(bad.errors().len(), 1);
    }

    #[test]
    fn test_stats_always_attached_for_consistency() {
        let stats = ConsistencyStats {
            total_nodes: 2,
            total_relationships: 1,
            ..Default::default()
        };
        let result = ValidationResult::with_stats(Vec::new(), stats);
        assert!(result.is_valid());
        assert_eq!(result.stats(), Some(&stats));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let err = ValidationError::at_row(2, Some("target"), "unknown node id 'A3'");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["row"], 2);
        assert_eq!(json["field"], "target");
        assert!(json.get("line").is_none());

        let json = serde_json::to_value(err.with_line(5)).unwrap();
        assert_eq!(json["line"], 5);

        let stats = ConsistencyStats {
            orphan_relationship_count: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["orphanRelationshipCount"], 1);
        assert_eq!(json["duplicateNodeCount"], 0);
    }

    #[test]
    fn test_display() {
        let err = ValidationError::at_row(3, None, "expected 2 columns, found 3");
        assert_eq!(err.to_string(), "row 3: expected 2 columns, found 3");
        assert_eq!(ValidationError::file_level("file is empty").to_string(), "file is empty");

        let err = ValidationError::at_row(2, Some("amount"), "must not be negative").with_line(4);
        assert_eq!(err.to_string(), "row 2 (line 4) [amount]: must not be negative");
    }
}
