//! semgraph: flat-file knowledge store with semantic search
//!
//! One TSV record per line, append-friendly, with a companion vector store
//! kept in sync against an external embedding generator.
//!
//! ## Architecture
//!
//! - **Record Model & Validator**: typed records with enum/range/date checks
//! - **Store Parser/Writer**: streaming TSV parse, escaped serialization,
//!   atomic compaction
//! - **Temporal Resolver**: active/archived status and pure archival
//!   transitions
//! - **Link Index**: single-hop adjacency over link records
//! - **Embedding Synchronizer**: fingerprint-based staleness detection and
//!   batched regeneration
//! - **Similarity Search Engine**: filtered cosine ranking with
//!   deterministic tie-breaks

pub mod config;
pub mod embedding;
pub mod links;
pub mod search;
pub mod stats;
pub mod store;
pub mod temporal;
pub mod types;

// Re-export core value types
pub use types::{ArchivedDate, Record, RecordKind, SearchFilter, Stance, SCHEMA_VERSION};

// Re-export store surface
pub use store::validation::{
    integrity_warnings, validate_store, IntegrityWarning, ValidationError, ValidationReport,
};
pub use store::{Header, Snapshot, StoreError};

// Re-export temporal and link surface
pub use links::{LinkDirection, LinkEdge, LinkIndex};
pub use temporal::{archive, is_active, ArchiveError};

// Re-export embedding surface
pub use embedding::{
    companion_path, synchronize, CommandGenerator, EmbeddingGenerator, SyncOptions, SyncReport,
    VectorEntry, VectorStore,
};

// Re-export search surface
pub use search::{cosine_similarity, keyword_search, search, SearchError, SearchHit};

// Re-export config
pub use config::AppConfig;
