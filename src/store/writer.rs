//! Store serialization and write paths
//!
//! Records are re-serialized tab-joined in header order. Appends go to the
//! end of the file (the store never rewrites old lines in place); the one
//! exception is [`write_snapshot`], the explicit compaction/rewrite path,
//! which stages to a temporary file and atomically renames so a concurrent
//! reader never observes a half-written store.

use super::{escape_field, Header, Snapshot, StoreError};
use crate::types::{fields, format_timestamp, Record};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Serialize one record as a line in `header` order (no trailing newline).
///
/// String fields are escaped so the separator and line endings never appear
/// raw. Unknown header fields are filled from `record.extra`, empty when
/// absent.
pub fn serialize_record(header: &Header, record: &Record) -> String {
    let mut out = String::with_capacity(128);
    for (i, name) in header.fields().iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        out.push_str(&field_value(record, name));
    }
    out
}

fn field_value(record: &Record, name: &str) -> String {
    match name {
        fields::ARCHIVED_DATE => record.archived_date.to_string(),
        fields::ID => escape_field(&record.id),
        fields::TYPE => record.kind.as_str().to_string(),
        fields::STANCE => escape_field(record.stance_token()),
        fields::TIMESTAMP => format_timestamp(record.timestamp),
        fields::CERTAINTY => format_float(record.certainty),
        fields::PERSPECTIVE => escape_field(&record.perspective),
        fields::DOMAIN => escape_field(record.domain.as_deref().unwrap_or("")),
        fields::REF1 => escape_field(record.ref1.as_deref().unwrap_or("")),
        fields::REF2 => escape_field(record.ref2.as_deref().unwrap_or("")),
        fields::CONTENT => escape_field(&record.content),
        fields::RELATION => escape_field(record.relation.as_deref().unwrap_or("")),
        fields::WEIGHT => format_float(record.weight),
        fields::SCHEMA => escape_field(&record.schema),
        fields::SEMANTIC_TEXT => escape_field(record.semantic_text.as_deref().unwrap_or("")),
        other => escape_field(record.extra.get(other).map_or("", String::as_str)),
    }
}

/// Shortest representation that parses back to the same f64.
fn format_float(value: f64) -> String {
    format!("{value}")
}

/// Append one record line. Creates the file with the given header when it
/// does not exist yet.
pub fn append_record(path: &Path, header: &Header, record: &Record) -> Result<(), StoreError> {
    let exists = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !exists {
        writeln!(file, "{}", header.to_line())?;
    }
    writeln!(file, "{}", serialize_record(header, record))?;
    tracing::debug!(id = %record.id, path = %path.display(), "record appended");
    Ok(())
}

/// Rewrite the whole store from a snapshot (the explicit compaction path).
///
/// Stages to `<path>.tmp` in the same directory, then renames over the
/// target so the swap is atomic on the filesystem.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let mut text = String::with_capacity(snapshot.len() * 128 + 256);
    text.push_str(&snapshot.header().to_line());
    text.push('\n');
    for record in snapshot.records() {
        text.push_str(&serialize_record(snapshot.header(), record));
        text.push('\n');
    }

    let tmp = staging_path(path);
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    tracing::info!(
        records = snapshot.len(),
        path = %path.display(),
        "store rewritten"
    );
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("store"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}
