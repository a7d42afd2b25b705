//! Streaming store parser
//!
//! Produces one record per consumed line without holding the whole file in
//! memory. Malformed rows surface as [`RowResult::Invalid`] with their line
//! number; the caller decides between tolerant (skip and report) and strict
//! (abort on first error) handling.

use super::validation::{record_from_row, IntegrityWarning, ValidationError};
use super::{unescape_field, Header, StoreError};
use crate::types::Record;
use std::io::BufRead;

/// A successfully parsed row.
#[derive(Debug)]
pub struct ParsedRow {
    pub record: Record,
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub warnings: Vec<IntegrityWarning>,
}

/// A row that could not be parsed, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

/// Outcome of reading one row.
#[derive(Debug)]
pub enum RowResult {
    Valid(ParsedRow),
    Invalid(SkippedLine),
}

/// Collected outcome of a tolerant parse.
#[derive(Debug, Default)]
pub struct ParseReport {
    /// Row-level and store-level validation errors (duplicate ids).
    pub errors: Vec<ValidationError>,
    /// Non-fatal findings (unknown-stance coercions).
    pub warnings: Vec<IntegrityWarning>,
    /// Rows skipped as unparsable.
    pub skipped: Vec<SkippedLine>,
}

/// Streaming reader over a store file.
///
/// Reads the header line on construction, then yields one [`RowResult`] per
/// data line. Handles LF and CRLF endings; blank lines are ignored.
#[derive(Debug)]
pub struct RecordReader<R: BufRead> {
    reader: R,
    header: Header,
    line_no: usize,
    buffer: String,
}

impl<R: BufRead> RecordReader<R> {
    /// Create a reader, consuming the header line.
    pub fn new(mut reader: R) -> Result<Self, StoreError> {
        let mut buffer = String::with_capacity(256);
        let bytes = reader.read_line(&mut buffer)?;
        if bytes == 0 {
            return Err(StoreError::MissingHeader);
        }
        let header = Header::parse(trim_line(&buffer))?;
        Ok(Self {
            reader,
            header,
            line_no: 1,
            buffer,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    fn read_row(&mut self) -> Result<Option<RowResult>, StoreError> {
        loop {
            self.buffer.clear();
            let bytes = self.reader.read_line(&mut self.buffer)?;
            if bytes == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = trim_line(&self.buffer);
            if line.is_empty() {
                continue;
            }

            let raw: Vec<&str> = line.split('\t').collect();
            if raw.len() != self.header.len() {
                return Ok(Some(RowResult::Invalid(SkippedLine {
                    line: self.line_no,
                    reason: format!(
                        "expected {} fields, found {}",
                        self.header.len(),
                        raw.len()
                    ),
                })));
            }

            let values: Vec<String> = raw.iter().map(|v| unescape_field(v)).collect();
            return Ok(Some(
                match record_from_row(&self.header, &values, self.line_no) {
                    Ok((record, warnings)) => RowResult::Valid(ParsedRow {
                        record,
                        line: self.line_no,
                        warnings,
                    }),
                    Err(err) => RowResult::Invalid(SkippedLine {
                        line: self.line_no,
                        reason: err.to_string(),
                    }),
                },
            ));
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<RowResult, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// Strip the line ending; tolerates both LF and CRLF.
fn trim_line(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}
