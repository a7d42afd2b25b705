//! Embedding layer: companion vector store, external generator bridge,
//! and the synchronizer that keeps the two stores consistent.

pub mod generator;
pub mod sync;
pub mod vector_store;

pub use generator::{CommandGenerator, EmbeddingGenerator, EmbeddingRequest, EmbeddingResult, GenerationError};
pub use sync::{synchronize, vector_state, SyncOptions, SyncReport, VectorState};
pub use vector_store::{companion_path, fingerprint, VectorEntry, VectorStore, VectorStoreError};
