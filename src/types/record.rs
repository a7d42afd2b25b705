//! Record types for the primary graph store
//!
//! One `Record` per TSV line. Records are immutable values — lifecycle
//! transitions (archival) return new values rather than mutating in place,
//! so the append-only store never rewrites history behind the caller's back.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Schema version written by this build.
pub const SCHEMA_VERSION: &str = "1";

/// Field names of the primary store, in canonical header order.
pub mod fields {
    pub const ARCHIVED_DATE: &str = "archived_date";
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const STANCE: &str = "stance";
    pub const TIMESTAMP: &str = "timestamp";
    pub const CERTAINTY: &str = "certainty";
    pub const PERSPECTIVE: &str = "perspective";
    pub const DOMAIN: &str = "domain";
    pub const REF1: &str = "ref1";
    pub const REF2: &str = "ref2";
    pub const CONTENT: &str = "content";
    pub const RELATION: &str = "relation";
    pub const WEIGHT: &str = "weight";
    pub const SCHEMA: &str = "schema";
    pub const SEMANTIC_TEXT: &str = "semantic_text";

    /// Canonical header order for newly created stores.
    pub const CANONICAL_HEADER: &[&str] = &[
        ARCHIVED_DATE,
        ID,
        TYPE,
        STANCE,
        TIMESTAMP,
        CERTAINTY,
        PERSPECTIVE,
        DOMAIN,
        REF1,
        REF2,
        CONTENT,
        RELATION,
        WEIGHT,
        SCHEMA,
        SEMANTIC_TEXT,
    ];

    /// Fields that must be present in every store header.
    pub const REQUIRED_HEADER: &[&str] = &[
        ARCHIVED_DATE,
        ID,
        TYPE,
        STANCE,
        TIMESTAMP,
        CERTAINTY,
        PERSPECTIVE,
        CONTENT,
        SCHEMA,
    ];

    /// All field names the record model understands. Anything else in a
    /// header is preserved opaquely in `Record::extra`.
    pub const KNOWN: &[&str] = CANONICAL_HEADER;

    pub fn is_known(name: &str) -> bool {
        KNOWN.contains(&name)
    }
}

/// Kind of a record: a knowledge item or a link between two items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Item,
    Link,
}

impl RecordKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "item" => Some(Self::Item),
            "link" => Some(Self::Link),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epistemic category of a record.
///
/// `certainty` semantics depend on the stance: confidence for
/// fact/opinion/observation/protocol, commitment strength for aspiration,
/// and usually near zero for question. `Link` is the literal marker carried
/// by link-kind records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Fact,
    Opinion,
    Aspiration,
    Observation,
    Link,
    Question,
    Protocol,
}

impl Stance {
    /// Parse a known stance token. Returns `None` for unrecognized values —
    /// the caller decides whether to coerce (forward-compatibility) or reject.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(Self::Fact),
            "opinion" => Some(Self::Opinion),
            "aspiration" => Some(Self::Aspiration),
            "observation" => Some(Self::Observation),
            "link" => Some(Self::Link),
            "question" => Some(Self::Question),
            "protocol" => Some(Self::Protocol),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Opinion => "opinion",
            Self::Aspiration => "aspiration",
            Self::Observation => "observation",
            Self::Link => "link",
            Self::Question => "question",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archival status: the `ACTIVE` sentinel or the calendar date the record
/// ceased to be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivedDate {
    Active,
    Archived(NaiveDate),
}

impl ArchivedDate {
    /// On-disk sentinel for a record that is still valid.
    pub const SENTINEL: &'static str = "ACTIVE";

    /// Parse the on-disk token. `None` means malformed (neither the sentinel
    /// nor an ISO `YYYY-MM-DD` date).
    pub fn parse(s: &str) -> Option<Self> {
        if s == Self::SENTINEL {
            return Some(Self::Active);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Self::Archived)
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// The archival date, if any.
    pub const fn date(self) -> Option<NaiveDate> {
        match self {
            Self::Active => None,
            Self::Archived(d) => Some(d),
        }
    }
}

impl fmt::Display for ArchivedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str(Self::SENTINEL),
            Self::Archived(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for ArchivedDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One entry of the primary store: a knowledge item or a link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub archived_date: ArchivedDate,
    pub id: String,
    pub kind: RecordKind,
    /// Effective stance. Unknown on-disk tokens coerce to `Fact`.
    pub stance: Stance,
    /// Original stance token when it was not a recognized value. Kept so
    /// serialization round-trips the unrecognized token instead of rewriting
    /// it to `fact`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stance: Option<String>,
    /// Event time — when the content became true, not when the line was
    /// written. May precede record creation.
    pub timestamp: DateTime<Utc>,
    /// Confidence / commitment strength in [0.0, 1.0].
    pub certainty: f64,
    /// Attributed source of the claim.
    pub perspective: String,
    /// Free-text topic tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub content: String,
    // Link-only fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Link strength in [0.0, 1.0]. Defaults to 1.0 when absent on disk.
    pub weight: f64,
    pub schema: String,
    /// Source text for vector generation. When absent, a synthesized string
    /// (perspective + stance + domain + content) is used instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_text: Option<String>,
    /// Values of header fields beyond the known schema, keyed by field name.
    /// Preserved opaquely for round-trip fidelity.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Record {
    /// Minimal active item record. Test fixtures and append paths start here
    /// and fill in the rest.
    pub fn new_item(id: &str, content: &str, stance: Stance, timestamp: DateTime<Utc>) -> Self {
        Self {
            archived_date: ArchivedDate::Active,
            id: id.to_string(),
            kind: RecordKind::Item,
            stance,
            raw_stance: None,
            timestamp,
            certainty: 1.0,
            perspective: String::new(),
            domain: None,
            content: content.to_string(),
            ref1: None,
            ref2: None,
            relation: None,
            weight: 1.0,
            schema: SCHEMA_VERSION.to_string(),
            semantic_text: None,
            extra: BTreeMap::new(),
        }
    }

    pub const fn is_link(&self) -> bool {
        matches!(self.kind, RecordKind::Link)
    }

    /// The stance token as it should appear on disk: the raw token when the
    /// original value was unrecognized, the effective stance otherwise.
    pub fn stance_token(&self) -> &str {
        self.raw_stance.as_deref().unwrap_or(self.stance.as_str())
    }

    /// Calendar date of the event timestamp, used for archival ordering.
    pub fn timestamp_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Text the vector generator should embed for this record: the explicit
    /// `semantic_text` field if present, otherwise a synthesized summary.
    pub fn semantic_source(&self) -> String {
        if let Some(ref text) = self.semantic_text {
            if !text.is_empty() {
                return text.clone();
            }
        }
        let domain = self.domain.as_deref().unwrap_or("");
        format!(
            "{} {} {} {}",
            self.perspective,
            self.stance_token(),
            domain,
            self.content
        )
    }
}

/// Parse an event timestamp. Accepts RFC 3339, a bare `YYYY-MM-DDTHH:MM:SS`,
/// or a date-only `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Canonical on-disk form of an event timestamp.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
