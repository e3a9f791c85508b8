//! Expected CSV shapes for the node and relationship files.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::{AttributeValue, DatasetKind, ValidationError};

/// Leading columns every node file must declare, in order
pub const NODE_KEY_COLUMNS: &[&str] = &["id"];

/// Leading columns every relationship file must declare, in order
pub const RELATIONSHIP_KEY_COLUMNS: &[&str] = &["source", "target", "type"];

/// Attribute columns holding amounts; must be non-negative numbers
const NUMERIC_ATTRIBUTES: &[&str] = &["amount", "value", "fee", "balance"];

/// Attribute columns holding points in time
const TIMESTAMP_ATTRIBUTES: &[&str] = &["timestamp", "block_time", "first_seen", "last_seen"];

const UTF8_BOM: &str = "\u{feff}";

/// Value format of an attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    NonNegativeNumber,
    Timestamp,
}

impl ColumnKind {
    /// Typing is decided by well-known column names; everything else is text
    pub fn for_attribute(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if NUMERIC_ATTRIBUTES.contains(&name.as_str()) {
            ColumnKind::NonNegativeNumber
        } else if TIMESTAMP_ATTRIBUTES.contains(&name.as_str()) {
            ColumnKind::Timestamp
        } else {
            ColumnKind::Text
        }
    }

    /// Parses one cell. Empty cells are accepted as [`AttributeValue::Empty`].
    pub fn parse(&self, raw: &str) -> Result<AttributeValue, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(AttributeValue::Empty);
        }

        match self {
            ColumnKind::Text => Ok(AttributeValue::Text(raw.to_string())),
            ColumnKind::NonNegativeNumber => parse_amount(value).map(AttributeValue::Number),
            ColumnKind::Timestamp => parse_timestamp(value).map(AttributeValue::Timestamp),
        }
    }
}

/// Accepts plain decimals (`123`, `0.5`) and returns the text unchanged so
/// no precision is lost on the way to the store
fn parse_amount(value: &str) -> Result<String, String> {
    if let Some(magnitude) = value.strip_prefix('-') {
        if is_plain_decimal(magnitude) {
            return Err(format!("'{}' must not be negative", value));
        }
    }

    if !is_plain_decimal(value) {
        return Err(format!("'{}' is not a plain decimal number", value));
    }

    Ok(value.to_string())
}

fn is_plain_decimal(value: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match value.split_once('.') {
        Some((int, frac)) => digits(int) && digits(frac),
        None => digits(value),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(seconds) = value.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp(seconds, 0) {
            return Ok(ts);
        }
    }

    Err(format!("'{}' is not a recognized timestamp", value))
}

/// Parses a key cell (node id, endpoint id or relationship type)
pub fn parse_key(raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(value.to_string())
}

/// Role of a column within a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Key,
    Attribute(ColumnKind),
}

/// One column of an accepted header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
}

/// Expected header shape for one dataset kind
#[derive(Debug, Clone, Copy)]
pub struct CsvSchema {
    kind: DatasetKind,
    key_columns: &'static [&'static str],
}

impl CsvSchema {
    pub fn for_kind(kind: DatasetKind) -> Self {
        let key_columns = match kind {
            DatasetKind::Nodes => NODE_KEY_COLUMNS,
            DatasetKind::Relationships => RELATIONSHIP_KEY_COLUMNS,
        };
        Self { kind, key_columns }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn key_columns(&self) -> &'static [&'static str] {
        self.key_columns
    }

    /// Checks a header row and resolves the role of every column.
    ///
    /// Key columns are matched case-insensitively, in order, at the start of
    /// the header. Remaining columns are attributes and must be named and
    /// unique.
    pub fn check_header(&self, header: &[String]) -> Result<Vec<ColumnSpec>, Vec<ValidationError>> {
        let names: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if i == 0 { name.trim_start_matches(UTF8_BOM) } else { name.as_str() };
                name.trim().to_string()
            })
            .collect();

        let keys_match = names.len() >= self.key_columns.len()
            && self
                .key_columns
                .iter()
                .zip(&names)
                .all(|(expected, found)| found.eq_ignore_ascii_case(expected));

        if !keys_match {
            let mut reason = format!(
                "{} header must start with '{}', found '{}'",
                self.kind,
                self.key_columns.join(","),
                names.join(",")
            );
            if names.len() == 1 && names[0].contains(&[';', '\t', '|'][..]) {
                reason.push_str(" (file does not appear to be comma-delimited)");
            }
            return Err(vec![ValidationError::file_level(reason)]);
        }

        let mut errors = Vec::new();
        let mut columns = Vec::with_capacity(names.len());

        for (index, name) in names.iter().enumerate() {
            if index < self.key_columns.len() {
                columns.push(ColumnSpec {
                    name: self.key_columns[index].to_string(),
                    role: ColumnRole::Key,
                });
                continue;
            }

            if name.is_empty() {
                errors.push(ValidationError::file_level(format!(
                    "header column {} has no name",
                    index + 1
                )));
                continue;
            }

            let duplicate = names[..index]
                .iter()
                .any(|earlier| earlier.eq_ignore_ascii_case(name));
            if duplicate {
                errors.push(ValidationError::file_level(format!(
                    "header column '{}' is declared more than once",
                    name
                )));
                continue;
            }

            columns.push(ColumnSpec {
                name: name.clone(),
                role: ColumnRole::Attribute(ColumnKind::for_attribute(name)),
            });
        }

        if errors.is_empty() {
            Ok(columns)
        } else {
            Err(errors)
        }
    }
}
