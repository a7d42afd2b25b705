//! Record and store validation
//!
//! Row-level checks build a [`Record`] or fail with a [`ValidationError`];
//! store-level checks (duplicate ids, dangling link references) produce a
//! collected [`ValidationReport`] rather than aborting on first error.
//! Numeric ranges are rejected, never clamped — clamping would silently
//! corrupt certainty semantics.

use super::parser::SkippedLine;
use super::{Header, Snapshot, StoreError};
use crate::links::LinkIndex;
use crate::types::{fields, parse_timestamp, ArchivedDate, Record, RecordKind, Stance};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// A semantically invalid record. Carries the line number and record id
/// where available so failures are actionable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("line {line}: missing required field '{field}'")]
    MissingRequiredField { line: usize, field: &'static str },

    #[error("line {line} (id '{id}'): invalid {field} value '{value}'")]
    InvalidEnumValue {
        line: usize,
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("line {line} (id '{id}'): unparsable {field} value '{value}'")]
    InvalidNumber {
        line: usize,
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("line {line} (id '{id}'): {field} {value} outside [0.0, 1.0]")]
    OutOfRangeNumeric {
        line: usize,
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("link '{id}' references unknown id '{target}' via {field}")]
    DanglingLinkReference {
        id: String,
        field: &'static str,
        target: String,
    },

    #[error("line {line} (id '{id}'): malformed date '{value}' in {field}")]
    MalformedDate {
        line: usize,
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("line {line} (id '{id}'): archived_date {archived} precedes timestamp {timestamp}")]
    ArchivedBeforeTimestamp {
        line: usize,
        id: String,
        archived: NaiveDate,
        timestamp: NaiveDate,
    },

    #[error("line {line}: duplicate active id '{id}'")]
    DuplicateId { line: usize, id: String },
}

/// A non-fatal integrity finding. Reported, never raised as a failure —
/// links may legitimately point at later-archived content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// A link references an id with no record in the store.
    DanglingLinkReference {
        link_id: String,
        field: &'static str,
        target: String,
    },
    /// A link references a record that has since been archived.
    ArchivedLinkTarget {
        link_id: String,
        field: &'static str,
        target: String,
    },
    /// A vector entry has no matching record and should be pruned.
    OrphanedVectorEntry { id: String },
    /// An unrecognized stance token was coerced to `fact`.
    UnknownStance {
        line: usize,
        id: String,
        token: String,
    },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingLinkReference { link_id, field, target } => {
                write!(f, "link '{link_id}' {field} points at unknown id '{target}'")
            }
            Self::ArchivedLinkTarget { link_id, field, target } => {
                write!(f, "link '{link_id}' {field} points at archived id '{target}'")
            }
            Self::OrphanedVectorEntry { id } => {
                write!(f, "vector entry '{id}' has no matching record")
            }
            Self::UnknownStance { line, id, token } => {
                write!(f, "line {line} (id '{id}'): unknown stance '{token}' treated as fact")
            }
        }
    }
}

/// Outcome of validating a whole store file.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<IntegrityWarning>,
    pub skipped: Vec<SkippedLine>,
    pub record_count: usize,
}

impl ValidationReport {
    /// Valid means no errors and no unreadable rows. Warnings alone do not
    /// fail validation.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_empty()
    }
}

// ============================================================================
// Row-level validation
// ============================================================================

/// Build a [`Record`] from one row of unescaped field values.
///
/// `values` is aligned with `header`; the caller has already checked the
/// field count. Returns the record plus any non-fatal warnings (currently
/// only the unknown-stance coercion).
pub fn record_from_row(
    header: &Header,
    values: &[String],
    line: usize,
) -> Result<(Record, Vec<IntegrityWarning>), ValidationError> {
    let field = |name: &str| -> &str {
        header
            .index_of(name)
            .and_then(|i| values.get(i))
            .map_or("", String::as_str)
    };
    let required = |name: &'static str| -> Result<&str, ValidationError> {
        let value = field(name);
        if value.is_empty() {
            Err(ValidationError::MissingRequiredField { line, field: name })
        } else {
            Ok(value)
        }
    };

    let id = required(fields::ID)?.to_string();
    let mut warnings = Vec::new();

    let kind_token = required(fields::TYPE)?;
    let kind = RecordKind::parse(kind_token).ok_or_else(|| ValidationError::InvalidEnumValue {
        line,
        id: id.clone(),
        field: fields::TYPE,
        value: kind_token.to_string(),
    })?;

    // Unknown stance tokens coerce to `fact` for forward compatibility; the
    // raw token survives for round-trip.
    let stance_token = required(fields::STANCE)?;
    let (stance, raw_stance) = match Stance::parse(stance_token) {
        Some(stance) => (stance, None),
        None => {
            warnings.push(IntegrityWarning::UnknownStance {
                line,
                id: id.clone(),
                token: stance_token.to_string(),
            });
            (Stance::Fact, Some(stance_token.to_string()))
        }
    };

    let archived_token = required(fields::ARCHIVED_DATE)?;
    let archived_date =
        ArchivedDate::parse(archived_token).ok_or_else(|| ValidationError::MalformedDate {
            line,
            id: id.clone(),
            field: fields::ARCHIVED_DATE,
            value: archived_token.to_string(),
        })?;

    let timestamp_token = required(fields::TIMESTAMP)?;
    let timestamp =
        parse_timestamp(timestamp_token).ok_or_else(|| ValidationError::MalformedDate {
            line,
            id: id.clone(),
            field: fields::TIMESTAMP,
            value: timestamp_token.to_string(),
        })?;

    if let Some(archived) = archived_date.date() {
        if archived < timestamp.date_naive() {
            return Err(ValidationError::ArchivedBeforeTimestamp {
                line,
                id,
                archived,
                timestamp: timestamp.date_naive(),
            });
        }
    }

    let certainty = parse_unit_interval(required(fields::CERTAINTY)?, fields::CERTAINTY, &id, line)?;

    let perspective = required(fields::PERSPECTIVE)?.to_string();
    let content = required(fields::CONTENT)?.to_string();
    let schema = required(fields::SCHEMA)?.to_string();

    let domain = non_empty(field(fields::DOMAIN));
    let semantic_text = non_empty(field(fields::SEMANTIC_TEXT));

    // Link-only fields. Weight defaults to 1.0 when absent.
    let (ref1, ref2, relation) = if kind == RecordKind::Link {
        (
            Some(required(fields::REF1)?.to_string()),
            Some(required(fields::REF2)?.to_string()),
            Some(required(fields::RELATION)?.to_string()),
        )
    } else {
        (
            non_empty(field(fields::REF1)),
            non_empty(field(fields::REF2)),
            non_empty(field(fields::RELATION)),
        )
    };

    let weight_token = field(fields::WEIGHT);
    let weight = if weight_token.is_empty() {
        1.0
    } else {
        parse_unit_interval(weight_token, fields::WEIGHT, &id, line)?
    };

    // Anything beyond the known schema rides along untouched.
    let mut extra = BTreeMap::new();
    for (i, name) in header.fields().iter().enumerate() {
        if !fields::is_known(name) {
            if let Some(value) = values.get(i) {
                extra.insert(name.clone(), value.clone());
            }
        }
    }

    let record = Record {
        archived_date,
        id,
        kind,
        stance,
        raw_stance,
        timestamp,
        certainty,
        perspective,
        domain,
        content,
        ref1,
        ref2,
        relation,
        weight,
        schema,
        semantic_text,
        extra,
    };
    Ok((record, warnings))
}

fn parse_unit_interval(
    token: &str,
    name: &'static str,
    id: &str,
    line: usize,
) -> Result<f64, ValidationError> {
    let value: f64 = token.parse().map_err(|_| ValidationError::InvalidNumber {
        line,
        id: id.to_string(),
        field: name,
        value: token.to_string(),
    })?;
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(ValidationError::OutOfRangeNumeric {
            line,
            id: id.to_string(),
            field: name,
            value,
        });
    }
    Ok(value)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ============================================================================
// Store-level validation
// ============================================================================

/// Link-integrity pass over a parsed snapshot: dangling and archived
/// reference targets, reported as warnings.
pub fn integrity_warnings(snapshot: &Snapshot) -> Vec<IntegrityWarning> {
    LinkIndex::build(snapshot).dangling(snapshot)
}

/// Validate a store file end to end: tolerant parse plus store-level checks.
///
/// Per-record problems are collected into the report rather than aborting
/// the pass. Only unreadable files fail outright.
pub fn validate_store(path: &Path) -> Result<ValidationReport, StoreError> {
    let (snapshot, parse_report) = Snapshot::load(path)?;

    let mut report = ValidationReport {
        errors: parse_report.errors,
        warnings: parse_report.warnings,
        skipped: parse_report.skipped,
        record_count: snapshot.len(),
    };
    report.warnings.extend(integrity_warnings(&snapshot));

    tracing::info!(
        records = report.record_count,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        skipped = report.skipped.len(),
        "store validation complete"
    );
    Ok(report)
}
