//! Archival status and transitions
//!
//! Archival is a pure value transition: `archive` returns a new record
//! instead of mutating, matching the append-only store's never-rewrite
//! history model. Once set, the archived date only moves forward.

use crate::types::{ArchivedDate, Record};
use chrono::NaiveDate;
use thiserror::Error;

/// Reasons an archival transition is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive date {date} precedes record timestamp date {timestamp}")]
    BeforeTimestamp { date: NaiveDate, timestamp: NaiveDate },

    #[error("archive date {date} precedes current archived date {current}")]
    NotMonotonic { date: NaiveDate, current: NaiveDate },
}

/// A record is active exactly when its archived date is the `ACTIVE`
/// sentinel.
pub fn is_active(record: &Record) -> bool {
    record.archived_date.is_active()
}

/// Archive a record as of `date`, returning the transitioned value.
///
/// Requires `date >= timestamp` (a record cannot cease being valid before
/// it became true) and, once archived, a non-decreasing archived date.
/// Re-archiving with the same date is a no-op transition and is allowed.
pub fn archive(record: &Record, date: NaiveDate) -> Result<Record, ArchiveError> {
    if date < record.timestamp_date() {
        return Err(ArchiveError::BeforeTimestamp {
            date,
            timestamp: record.timestamp_date(),
        });
    }
    if let Some(current) = record.archived_date.date() {
        if date < current {
            return Err(ArchiveError::NotMonotonic { date, current });
        }
    }

    let mut archived = record.clone();
    archived.archived_date = ArchivedDate::Archived(date);
    Ok(archived)
}
