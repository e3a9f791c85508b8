//! Typed rows read from the node and relationship files.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A typed attribute cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Validated non-negative decimal, kept as the exact text from the file.
    /// On-chain amounts routinely exceed what an `f64` holds exactly.
    Number(String),
    Timestamp(DateTime<Utc>),
    Text(String),
    Empty,
}

impl AttributeValue {
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Number(n) => Value::String(n.clone()),
            AttributeValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::Empty => Value::Null,
        }
    }
}

/// Ordered attribute list, in header order
pub type Attributes = Vec<(String, AttributeValue)>;

fn attributes_to_map(attributes: &Attributes) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

/// An address node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: String,
    pub attributes: Attributes,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push((key.into(), value));
        self
    }

    /// Attribute map as stored on the node record
    pub fn properties(&self) -> Map<String, Value> {
        attributes_to_map(&self.attributes)
    }
}

/// A directed transaction edge between two node ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipRecord {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    pub attributes: Attributes,
}

impl RelationshipRecord {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type: rel_type.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push((key.into(), value));
        self
    }

    pub fn properties(&self) -> Map<String, Value> {
        attributes_to_map(&self.attributes)
    }
}
