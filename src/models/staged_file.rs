//! Handle to an upload persisted in the request's staging area.

use std::path::PathBuf;

use serde::Serialize;

/// Which of the two dataset files a staged upload holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Nodes,
    Relationships,
}

impl DatasetKind {
    /// Multipart field name carrying this file
    pub fn field_name(&self) -> &'static str {
        match self {
            DatasetKind::Nodes => "nodes",
            DatasetKind::Relationships => "relationships",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "nodes" => Some(DatasetKind::Nodes),
            "relationships" => Some(DatasetKind::Relationships),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A fully written upload on local disk.
///
/// The file lives inside a `StagingArea` and is removed with it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
    pub declared_mime_type: Option<String>,
    /// SHA256 of the written bytes (hex)
    pub checksum: String,
}
