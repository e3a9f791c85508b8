//! Streaming, typed reader over a staged dataset file.
//!
//! Shared by the structural pass, the consistency pass and the bulk loader so
//! all three interpret cells identically. Rows are read one at a time into a
//! reused buffer; nothing beyond the current row is held in memory. This is
//! blocking I/O and must run on the blocking pool.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder};
use thiserror::Error;

use crate::models::{Attributes, DatasetKind, NodeRecord, RelationshipRecord, ValidationError};

use super::schema::{parse_key, ColumnRole, ColumnSpec, CsvSchema};

/// A record type that can be built from one CSV row
pub trait DatasetRecord: Sized + Send + 'static {
    const KIND: DatasetKind;

    /// `keys` holds exactly the schema's key columns, in order
    fn from_parts(keys: Vec<String>, attributes: Attributes) -> Self;
}

impl DatasetRecord for NodeRecord {
    const KIND: DatasetKind = DatasetKind::Nodes;

    fn from_parts(keys: Vec<String>, attributes: Attributes) -> Self {
        let mut keys = keys.into_iter();
        NodeRecord {
            id: keys.next().unwrap_or_default(),
            attributes,
        }
    }
}

impl DatasetRecord for RelationshipRecord {
    const KIND: DatasetKind = DatasetKind::Relationships;

    fn from_parts(keys: Vec<String>, attributes: Attributes) -> Self {
        let mut keys = keys.into_iter();
        RelationshipRecord {
            source_id: keys.next().unwrap_or_default(),
            target_id: keys.next().unwrap_or_default(),
            rel_type: keys.next().unwrap_or_default(),
            attributes,
        }
    }
}

/// Failures that stop a scan
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header: {}", summarize(.0))]
    Header(Vec<ValidationError>),

    #[error("Unreadable CSV after row {row}: {source}")]
    Csv {
        row: u64,
        #[source]
        source: csv::Error,
    },
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One data row: its 1-based number, the physical line it starts on and
/// either the typed record or every problem found in it
#[derive(Debug)]
pub struct Row<T> {
    pub number: u64,
    pub line: u64,
    pub parsed: Result<T, Vec<ValidationError>>,
}

/// Hands bytes to the CSV parser and notes where line breaks fall.
///
/// The parser skips blank lines and quoted cells may contain newlines, so
/// the record count alone does not say where a row sits in the file.
struct LineTracker<R> {
    inner: R,
    offset: u64,
    breaks: VecDeque<(u64, u8)>,
    settled_lines: u64,
}

impl<R> LineTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            breaks: VecDeque::new(),
            settled_lines: 0,
        }
    }

    /// 1-based line of the first byte at or after `from` that is not a line
    /// break. Offsets must not go backwards between calls.
    fn line_after_breaks(&mut self, from: u64) -> u64 {
        while let Some(&(at, byte)) = self.breaks.front() {
            if at >= from {
                break;
            }
            if byte == b'\n' {
                self.settled_lines += 1;
            }
            self.breaks.pop_front();
        }

        let mut line = self.settled_lines + 1;
        let mut next = from;
        for &(at, byte) in &self.breaks {
            if at != next {
                break;
            }
            if byte == b'\n' {
                line += 1;
            }
            next += 1;
        }
        line
    }
}

impl<R: Read> Read for LineTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (i, &byte) in buf[..n].iter().enumerate() {
            if byte == b'\n' || byte == b'\r' {
                self.breaks.push_back((self.offset + i as u64, byte));
            }
        }
        self.offset += n as u64;
        Ok(n)
    }
}

/// Row iterator over a staged CSV file
pub struct DatasetReader<T: DatasetRecord> {
    inner: csv::Reader<LineTracker<File>>,
    columns: Vec<ColumnSpec>,
    key_count: usize,
    record: ByteRecord,
    row: u64,
    _marker: PhantomData<T>,
}

impl<T: DatasetRecord> DatasetReader<T> {
    /// Opens the file and checks its header against the schema for `T`
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut inner = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(LineTracker::new(file));

        let header = inner
            .byte_headers()
            .map_err(|source| ReaderError::Csv { row: 0, source })?
            .clone();

        let header = decode_header(&header)?;
        let schema = CsvSchema::for_kind(T::KIND);
        let columns = schema.check_header(&header).map_err(ReaderError::Header)?;

        Ok(Self {
            inner,
            columns,
            key_count: schema.key_columns().len(),
            record: ByteRecord::new(),
            row: 0,
            _marker: PhantomData,
        })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Number of data rows read so far
    pub fn rows_read(&self) -> u64 {
        self.row
    }

    fn parse_current(&self, line: u64) -> Result<T, Vec<ValidationError>> {
        let row = self.row;

        if self.record.len() != self.columns.len() {
            return Err(vec![ValidationError::at_row(
                row,
                None,
                format!(
                    "expected {} columns, found {}",
                    self.columns.len(),
                    self.record.len()
                ),
            )
            .with_line(line)]);
        }

        let mut errors = Vec::new();
        let mut keys = Vec::with_capacity(self.key_count);
        let mut attributes = Vec::with_capacity(self.columns.len() - self.key_count);

        for (spec, raw) in self.columns.iter().zip(self.record.iter()) {
            let text = match std::str::from_utf8(raw) {
                Ok(text) => text,
                Err(_) => {
                    errors.push(
                        ValidationError::at_row(row, Some(&spec.name), "value is not valid UTF-8")
                            .with_line(line),
                    );
                    continue;
                }
            };

            let parsed = match &spec.role {
                ColumnRole::Key => parse_key(text).map(|key| keys.push(key)),
                ColumnRole::Attribute(kind) => kind
                    .parse(text)
                    .map(|value| attributes.push((spec.name.clone(), value))),
            };

            if let Err(reason) = parsed {
                errors.push(ValidationError::at_row(row, Some(&spec.name), reason).with_line(line));
            }
        }

        if errors.is_empty() {
            Ok(T::from_parts(keys, attributes))
        } else {
            Err(errors)
        }
    }
}

impl<T: DatasetRecord> Iterator for DatasetReader<T> {
    type Item = Result<Row<T>, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                self.row += 1;
                let from = self.record.position().map_or(0, |pos| pos.byte());
                let line = self.inner.get_mut().line_after_breaks(from);
                Some(Ok(Row {
                    number: self.row,
                    line,
                    parsed: self.parse_current(line),
                }))
            }
            Err(source) => Some(Err(ReaderError::Csv {
                row: self.row,
                source,
            })),
        }
    }
}

fn decode_header(header: &ByteRecord) -> Result<Vec<String>, ReaderError> {
    if header.is_empty() || header.iter().all(|field| field.is_empty()) {
        return Err(ReaderError::Header(vec![ValidationError::file_level(
            "file is empty: a header row is required",
        )]));
    }

    header
        .iter()
        .map(|field| std::str::from_utf8(field).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| {
            ReaderError::Header(vec![ValidationError::file_level(
                "header is not valid UTF-8 text; the file may be binary or use another encoding",
            )])
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_typed_nodes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nodes.csv", b"id,label\nA1,wallet\nA2,exchange\n");

        let reader = DatasetReader::<NodeRecord>::open(&path).unwrap();
        let rows: Vec<_> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 1);
        let first = rows[0].parsed.as_ref().unwrap();
        assert_eq!(first.id, "A1");
        assert_eq!(first.attributes[0].0, "label");
    }

    #[test]
    fn test_reads_typed_relationships() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "rels.csv",
            b"source,target,type,amount\nA1,A2,transfer,1.5\n",
        );

        let mut reader = DatasetReader::<RelationshipRecord>::open(&path).unwrap();
        let row = reader.next().unwrap().unwrap();
        let rel = row.parsed.unwrap();

        assert_eq!(rel.source_id, "A1");
        assert_eq!(rel.target_id, "A2");
        assert_eq!(rel.rel_type, "transfer");
        assert!(reader.next().is_none());
        assert_eq!(reader.rows_read(), 1);
    }

    #[test]
    fn test_ragged_row_is_row_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nodes.csv", b"id,label\nA1\nA2,wallet\n");

        let rows: Vec<_> = DatasetReader::<NodeRecord>::open(&path)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        let errors = rows[0].parsed.as_ref().unwrap_err();
        assert_eq!(errors[0].row, Some(1));
        assert!(rows[1].parsed.is_ok());
    }

    #[test]
    fn test_lines_account_for_blank_lines_and_multiline_cells() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "nodes.csv",
            b"id,label\nA1,wallet\n\nA2,\"multi\nline\"\nA3,x,extra\n",
        );

        let rows: Vec<_> = DatasetReader::<NodeRecord>::open(&path)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        let positions: Vec<_> = rows.iter().map(|r| (r.number, r.line)).collect();
        assert_eq!(positions, vec![(1, 2), (2, 4), (3, 6)]);

        let errors = rows[2].parsed.as_ref().unwrap_err();
        assert_eq!(errors[0].row, Some(3));
        assert_eq!(errors[0].line, Some(6));
    }

    #[test]
    fn test_lines_with_crlf_terminators() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nodes.csv", b"id\r\nA1\r\n\r\nA2\r\n");

        let lines: Vec<_> = DatasetReader::<NodeRecord>::open(&path)
            .unwrap()
            .map(|r| r.unwrap().line)
            .collect();

        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_empty_file_is_header_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nodes.csv", b"");

        let result = DatasetReader::<NodeRecord>::open(&path);
        assert!(matches!(result, Err(ReaderError::Header(ref e)) if e.len() == 1));
    }

    #[test]
    fn test_binary_header_is_single_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nodes.csv", &[0xff, 0xfe, 0x00, 0x81, b'\n', 0x9f, 0x92]);

        match DatasetReader::<NodeRecord>::open(&path) {
            Err(ReaderError::Header(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected header error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = TempDir::new().unwrap();
        let result = DatasetReader::<NodeRecord>::open(&dir.path().join("missing.csv"));
        assert!(matches!(result, Err(ReaderError::Open { .. })));
    }
}
