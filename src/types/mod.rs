//! Core value types

mod filter;
mod record;

pub use filter::SearchFilter;
pub use record::{
    fields, format_timestamp, parse_timestamp, ArchivedDate, Record, RecordKind, Stance,
    SCHEMA_VERSION,
};
