//! Primary store: TSV parse, validation and write paths
//!
//! The on-disk format is one header line defining field order, then one
//! record per line, tab-separated, UTF-8, LF or CRLF. The parsed form is a
//! caller-owned [`Snapshot`] — there is no process-global cache; re-parsing
//! the file is the one and only invalidation path.

pub mod parser;
pub mod validation;
pub mod writer;

use crate::types::{fields, ArchivedDate, Record};
use parser::{ParseReport, RecordReader, RowResult, SkippedLine};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use thiserror::Error;
use validation::ValidationError;

/// Errors from the store parse/write paths.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("store has no header row")]
    MissingHeader,

    #[error("header missing required field '{0}'")]
    HeaderMissingField(&'static str),

    #[error("line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },

    #[error("unknown record id '{0}'")]
    UnknownId(String),

    #[error("duplicate active id '{0}'")]
    DuplicateId(String),
}

/// Header of a store file: field names in on-disk order.
///
/// Unknown fields are carried along, never discarded — a newer writer's
/// extra columns survive a round trip through this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    /// Canonical header for newly created stores.
    pub fn canonical() -> Self {
        Self {
            names: fields::CANONICAL_HEADER.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Parse a header line. Fails when a required field is absent.
    pub fn parse(line: &str) -> Result<Self, StoreError> {
        let names: Vec<String> = line.split('\t').map(str::to_string).collect();
        for required in fields::REQUIRED_HEADER {
            if !names.iter().any(|n| n == required) {
                return Err(StoreError::HeaderMissingField(required));
            }
        }
        Ok(Self { names })
    }

    pub fn fields(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Header fields outside the known schema.
    pub fn unknown_fields(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|n| !fields::is_known(n))
    }

    /// The serialized header line (no trailing newline).
    pub fn to_line(&self) -> String {
        self.names.join("\t")
    }
}

/// A parsed store: header plus records, indexed by id.
///
/// Owned by the caller. Lookups prefer the active record when an id appears
/// both active and archived (archival appends keep history around).
#[derive(Debug, Clone)]
pub struct Snapshot {
    header: Header,
    records: Vec<Record>,
    by_id: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            records: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Build a snapshot from already-validated records.
    pub fn from_records(header: Header, records: Vec<Record>) -> Self {
        let mut snapshot = Self::new(header);
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Load a store tolerantly: malformed rows are skipped and reported in
    /// the [`ParseReport`] with their line numbers.
    pub fn load(path: &Path) -> Result<(Self, ParseReport), StoreError> {
        let file = File::open(path)?;
        let mut reader = RecordReader::new(BufReader::new(file))?;
        let header = reader.header().clone();
        let mut snapshot = Self::new(header);
        let mut report = ParseReport::default();

        for row in reader.by_ref() {
            match row? {
                RowResult::Valid(parsed) => {
                    report.warnings.extend(parsed.warnings);
                    if snapshot.would_collide(&parsed.record) {
                        report.errors.push(ValidationError::DuplicateId {
                            line: parsed.line,
                            id: parsed.record.id.clone(),
                        });
                    }
                    snapshot.insert(parsed.record);
                }
                RowResult::Invalid(skipped) => {
                    tracing::warn!(line = skipped.line, reason = %skipped.reason, "skipping malformed row");
                    report.skipped.push(skipped);
                }
            }
        }

        Ok((snapshot, report))
    }

    /// Load a store strictly: the first malformed row aborts the parse.
    pub fn load_strict(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let mut reader = RecordReader::new(BufReader::new(file))?;
        let header = reader.header().clone();
        let mut snapshot = Self::new(header);

        for row in reader.by_ref() {
            match row? {
                RowResult::Valid(parsed) => {
                    if snapshot.would_collide(&parsed.record) {
                        return Err(StoreError::DuplicateId(parsed.record.id));
                    }
                    snapshot.insert(parsed.record);
                }
                RowResult::Invalid(SkippedLine { line, reason }) => {
                    return Err(StoreError::InvalidRow { line, reason });
                }
            }
        }

        Ok(snapshot)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Iterate non-archived records.
    pub fn iter_active(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.archived_date.is_active())
    }

    /// Append a record to the snapshot, keeping the id index current.
    pub fn insert(&mut self, record: Record) {
        let idx = self.records.len();
        match self.by_id.get(&record.id) {
            // The active record wins the index slot; archived history stays
            // reachable by scanning `records()`.
            Some(&existing) if self.records[existing].archived_date.is_active() => {
                if record.archived_date.is_active() {
                    self.by_id.insert(record.id.clone(), idx);
                }
            }
            _ => {
                self.by_id.insert(record.id.clone(), idx);
            }
        }
        self.records.push(record);
    }

    /// Replace the indexed record for an id with a new value.
    pub fn replace(&mut self, record: Record) -> Result<(), StoreError> {
        let idx = *self
            .by_id
            .get(&record.id)
            .ok_or_else(|| StoreError::UnknownId(record.id.clone()))?;
        self.records[idx] = record;
        Ok(())
    }

    /// Whether inserting this record would violate id uniqueness among
    /// non-archived records.
    fn would_collide(&self, record: &Record) -> bool {
        if !record.archived_date.is_active() {
            return false;
        }
        self.get(&record.id)
            .is_some_and(|existing| existing.archived_date.is_active())
    }

    /// Count of archived records.
    pub fn archived_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.archived_date, ArchivedDate::Archived(_)))
            .count()
    }
}

// ============================================================================
// Field escaping
// ============================================================================

/// Escape a field value for the tab-separated line format.
///
/// The separator and line endings must never appear raw inside a field —
/// they are escaped here and reversed by [`unescape_field`], never truncated.
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse [`escape_field`]. A trailing lone backslash is kept as-is.
pub fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
