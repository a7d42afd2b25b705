//! Companion vector store
//!
//! A TSV sidecar next to the primary store with header
//! `archived_date  id  semantic_text  embedding`, where `embedding` is a
//! bracketed comma-separated float list. The `semantic_text` column is the
//! exact text the vector was generated from; its MD5 fingerprint is what
//! the synchronizer compares against the owning record.

use crate::types::ArchivedDate;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header of the companion store, in order.
pub const VECTOR_HEADER: &[&str] = &["archived_date", "id", "semantic_text", "embedding"];

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("vector store has no header row")]
    MissingHeader,

    #[error("vector store header mismatch: expected '{expected}', found '{found}'")]
    HeaderMismatch { expected: String, found: String },
}

/// MD5 hex fingerprint of a semantic text. This is the staleness signal:
/// a vector entry whose fingerprint differs from its record's current
/// semantic text needs regeneration.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", md5::compute(text))
}

/// Derive the companion store path from the primary store path:
/// `graph.tsv` → `graph_semantics.tsv`.
pub fn companion_path(graph_path: &Path) -> PathBuf {
    let stem = graph_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("graph");
    graph_path.with_file_name(format!("{stem}_semantics.tsv"))
}

/// The embedding and source text associated with one record.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub archived_date: ArchivedDate,
    pub id: String,
    /// Exact text the embedding was generated from.
    pub semantic_text: String,
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// Fingerprint of the text this vector was generated from.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.semantic_text)
    }
}

/// In-memory companion store, indexed by record id.
#[derive(Debug, Default)]
pub struct VectorStore {
    entries: Vec<VectorEntry>,
    by_id: HashMap<String, usize>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the companion file. A missing file is an empty store, not an
    /// error — the first synchronization pass creates it. Rows with an
    /// unparsable or non-finite embedding are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self, VectorStoreError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no vector store yet, starting empty");
            return Ok(Self::new());
        }

        let mut lines = BufReader::new(File::open(path)?).lines();
        let header = lines.next().ok_or(VectorStoreError::MissingHeader)??;
        let expected = VECTOR_HEADER.join("\t");
        let trimmed = header.trim_end_matches('\r');
        if trimmed != expected {
            return Err(VectorStoreError::HeaderMismatch {
                expected,
                found: trimmed.to_string(),
            });
        }

        let mut store = Self::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let line_no = i + 2;
            match parse_entry(line) {
                Some(entry) => store.upsert(entry),
                None => {
                    tracing::warn!(line = line_no, "skipping malformed vector entry");
                }
            }
        }
        Ok(store)
    }

    /// Write the store to disk: staged to a `.tmp` sibling, then atomically
    /// renamed so a concurrent reader never sees a half-written file.
    pub fn save(&self, path: &Path) -> Result<(), VectorStoreError> {
        let mut text = String::with_capacity(self.entries.len() * 1024 + 64);
        text.push_str(&VECTOR_HEADER.join("\t"));
        text.push('\n');
        for entry in &self.entries {
            text.push_str(&serialize_entry(entry));
            text.push('\n');
        }

        let mut tmp_name = path.file_name().map_or_else(
            || std::ffi::OsString::from("semantics"),
            std::ffi::OsStr::to_os_string,
        );
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(entries = self.entries.len(), path = %path.display(), "vector store saved");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert or replace the entry for an id.
    pub fn upsert(&mut self, entry: VectorEntry) {
        match self.by_id.get(&entry.id) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.by_id.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Drop every entry whose id fails the predicate; returns how many were
    /// removed. Used to prune orphans at the end of a sync pass.
    pub fn retain<F: Fn(&str) -> bool>(&mut self, keep: F) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| keep(&e.id));
        self.by_id.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.by_id.insert(entry.id.clone(), i);
        }
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VectorEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality shared by stored vectors, from the first entry.
    /// The store contract requires all entries to agree.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }
}

fn parse_entry(line: &str) -> Option<VectorEntry> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() != VECTOR_HEADER.len() {
        return None;
    }
    let archived_date = ArchivedDate::parse(parts[0])?;
    let id = crate::store::unescape_field(parts[1]);
    if id.is_empty() {
        return None;
    }
    let semantic_text = crate::store::unescape_field(parts[2]);
    let embedding: Vec<f32> = serde_json::from_str(parts[3]).ok()?;
    if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(VectorEntry {
        archived_date,
        id,
        semantic_text,
        embedding,
    })
}

fn serialize_entry(entry: &VectorEntry) -> String {
    let floats: Vec<String> = entry.embedding.iter().map(|v| format!("{v}")).collect();
    format!(
        "{}\t{}\t{}\t[{}]",
        entry.archived_date,
        crate::store::escape_field(&entry.id),
        crate::store::escape_field(&entry.semantic_text),
        floats.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, text: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            archived_date: ArchivedDate::Active,
            id: id.to_string(),
            semantic_text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = fingerprint("water boils at 100C");
        assert_eq!(a, fingerprint("water boils at 100C"));
        assert_ne!(a, fingerprint("water boils at 99C"));
        assert_eq!(a.len(), 32); // md5 hex
    }

    #[test]
    fn test_companion_path_derivation() {
        assert_eq!(
            companion_path(Path::new("brain/graph.tsv")),
            Path::new("brain/graph_semantics.tsv")
        );
        assert_eq!(
            companion_path(Path::new("notes.tsv")),
            Path::new("notes_semantics.tsv")
        );
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph_semantics.tsv");

        let mut store = VectorStore::new();
        store.upsert(entry("a", "first text", vec![0.25, -0.5, 1.0]));
        store.upsert(entry("b", "text with\ttab", vec![0.0, 0.125, 0.75]));
        store.save(&path).unwrap();

        let reloaded = VectorStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("a").unwrap().embedding, vec![0.25, -0.5, 1.0]);
        assert_eq!(reloaded.get("b").unwrap().semantic_text, "text with\ttab");
    }

    #[test]
    fn test_escaped_id_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph_semantics.tsv");

        let mut store = VectorStore::new();
        store.upsert(entry("note\\2024", "escaped id", vec![1.0, 0.0]));
        store.save(&path).unwrap();

        let reloaded = VectorStore::load(&path).unwrap();
        assert!(reloaded.contains("note\\2024"));
        assert_eq!(reloaded.get("note\\2024").unwrap().semantic_text, "escaped id");
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::load(&tmp.path().join("absent.tsv")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_embedding_rows_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph_semantics.tsv");
        let text = format!(
            "{}\nACTIVE\ta\tgood\t[0.5, 0.5]\nACTIVE\tb\tbad\tnot-json\n",
            VECTOR_HEADER.join("\t")
        );
        fs::write(&path, text).unwrap();

        let store = VectorStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_retain_reindexes() {
        let mut store = VectorStore::new();
        store.upsert(entry("a", "t", vec![1.0]));
        store.upsert(entry("b", "t", vec![2.0]));
        store.upsert(entry("c", "t", vec![3.0]));

        let removed = store.retain(|id| id != "b");
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("c").unwrap().embedding, vec![3.0]);
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut store = VectorStore::new();
        store.upsert(entry("a", "old", vec![1.0]));
        store.upsert(entry("a", "new", vec![2.0]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().semantic_text, "new");
    }
}
