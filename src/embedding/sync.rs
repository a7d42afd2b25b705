//! Embedding synchronizer
//!
//! Keeps the companion vector store consistent with the primary store.
//! Each active record is classified {missing, stale, fresh} by comparing
//! the MD5 fingerprint of its current semantic text against the stored
//! entry's; non-fresh records are regenerated in bounded batches. Partial
//! failures never block the rest of a pass — failed ids stay non-fresh and
//! are retried next time. Orphaned entries are pruned at the end.

use super::generator::{EmbeddingGenerator, EmbeddingRequest};
use super::vector_store::{fingerprint, VectorEntry, VectorStore};
use crate::store::Snapshot;
use crate::types::Record;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Synchronization state of one record's vector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorState {
    /// No entry exists for the record.
    Missing,
    /// An entry exists but was generated from different semantic text.
    Stale,
    /// The entry's fingerprint matches the record's current semantic text.
    Fresh,
}

/// Classify a record against the vector store.
pub fn vector_state(record: &Record, store: &VectorStore) -> VectorState {
    store.get(&record.id).map_or(VectorState::Missing, |entry| {
        if entry.fingerprint() == fingerprint(&record.semantic_source()) {
            VectorState::Fresh
        } else {
            VectorState::Stale
        }
    })
}

/// Knobs for a synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum `(id, text)` pairs per generator call. Bounds memory and
    /// isolates partial failures.
    pub batch_size: usize,
    /// Upper bound on each generator call. A timed-out batch is treated
    /// like a failed batch and retried on the next pass.
    pub timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            timeout: None,
        }
    }
}

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Active records whose entry was already up to date.
    pub fresh_count: usize,
    /// Entries (re)generated and committed this pass.
    pub regenerated_count: usize,
    /// Ids whose generation failed or timed out; retried next pass.
    pub failed_ids: Vec<String>,
    /// Orphaned entries removed (no matching record in the store).
    pub pruned_count: usize,
}

/// Run one synchronization pass over `snapshot` and `vectors`.
///
/// Mutates `vectors` in place; the caller persists it afterwards (the save
/// path stages and atomically renames). Running a second pass with no
/// record changes in between regenerates nothing.
pub async fn synchronize(
    snapshot: &Snapshot,
    vectors: &mut VectorStore,
    generator: &dyn EmbeddingGenerator,
    options: &SyncOptions,
) -> SyncReport {
    let mut report = SyncReport::default();
    let mut pending: Vec<(String, String)> = Vec::new();

    for record in snapshot.iter_active() {
        match vector_state(record, vectors) {
            VectorState::Fresh => report.fresh_count += 1,
            VectorState::Missing | VectorState::Stale => {
                pending.push((record.id.clone(), record.semantic_source()));
            }
        }
    }

    tracing::info!(
        fresh = report.fresh_count,
        pending = pending.len(),
        generator = generator.name(),
        "synchronization pass started"
    );

    let batch_size = options.batch_size.max(1);
    for chunk in pending.chunks(batch_size) {
        let batch: Vec<EmbeddingRequest> = chunk
            .iter()
            .map(|(id, text)| EmbeddingRequest {
                id: id.clone(),
                text: text.clone(),
            })
            .collect();

        let call = generator.embed_batch(&batch);
        let outcome = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(super::generator::GenerationError::Timeout),
            },
            None => call.await,
        };

        match outcome {
            Ok(results) => {
                let mut texts: HashMap<&str, &str> = chunk
                    .iter()
                    .map(|(id, text)| (id.as_str(), text.as_str()))
                    .collect();

                for result in results {
                    let Some(text) = texts.remove(result.id.as_str()) else {
                        tracing::warn!(id = %result.id, "generator replied for an id it was not asked about");
                        continue;
                    };
                    match result.outcome {
                        Ok(embedding) => {
                            if let Some(dim) = vectors.dimension() {
                                if embedding.len() != dim {
                                    tracing::warn!(
                                        id = %result.id,
                                        got = embedding.len(),
                                        expected = dim,
                                        "generator returned a vector of the wrong dimension"
                                    );
                                    report.failed_ids.push(result.id);
                                    continue;
                                }
                            }
                            vectors.upsert(VectorEntry {
                                archived_date: crate::types::ArchivedDate::Active,
                                id: result.id,
                                semantic_text: text.to_string(),
                                embedding,
                            });
                            report.regenerated_count += 1;
                        }
                        Err(message) => {
                            tracing::warn!(id = %result.id, error = %message, "generation failed for id");
                            report.failed_ids.push(result.id);
                        }
                    }
                }
                // Ids the generator never answered for count as failed.
                for (id, _) in texts {
                    tracing::warn!(id, "generator returned no reply for id");
                    report.failed_ids.push(id.to_string());
                }
            }
            Err(err) => {
                // Whole batch failed; every id in it retries next pass.
                tracing::warn!(
                    batch_len = chunk.len(),
                    error = %err,
                    "generator batch failed"
                );
                report
                    .failed_ids
                    .extend(chunk.iter().map(|(id, _)| id.clone()));
            }
        }
    }

    report.pruned_count = vectors.retain(|id| snapshot.contains(id));

    tracing::info!(
        fresh = report.fresh_count,
        regenerated = report.regenerated_count,
        failed = report.failed_ids.len(),
        pruned = report.pruned_count,
        "synchronization pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::generator::{EmbeddingResult, GenerationError};
    use crate::store::Header;
    use crate::types::Stance;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic in-process generator: hashes text bytes into a small
    /// vector, optionally failing configured ids.
    struct StubGenerator {
        fail_ids: Vec<String>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl StubGenerator {
        fn new() -> Self {
            Self {
                fail_ids: Vec::new(),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn failing(ids: &[&str]) -> Self {
            Self {
                fail_ids: ids.iter().map(|s| (*s).to_string()).collect(),
                ..Self::new()
            }
        }

        fn embed(text: &str) -> Vec<f32> {
            let mut v = [0.0f32; 4];
            for (i, b) in text.bytes().enumerate() {
                v[i % 4] += f32::from(b) / 255.0;
            }
            v.to_vec()
        }
    }

    #[async_trait]
    impl EmbeddingGenerator for StubGenerator {
        async fn embed_batch(
            &self,
            batch: &[EmbeddingRequest],
        ) -> Result<Vec<EmbeddingResult>, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(batch
                .iter()
                .map(|request| EmbeddingResult {
                    id: request.id.clone(),
                    outcome: if self.fail_ids.contains(&request.id) {
                        Err("stub failure".to_string())
                    } else {
                        Ok(Self::embed(&request.text))
                    },
                })
                .collect())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn item(id: &str, content: &str) -> Record {
        let mut record = Record::new_item(id, content, Stance::Fact, Utc::now());
        record.perspective = "me".to_string();
        record
    }

    fn snapshot(records: Vec<Record>) -> Snapshot {
        Snapshot::from_records(Header::canonical(), records)
    }

    #[tokio::test]
    async fn test_missing_entries_are_generated() {
        let snap = snapshot(vec![item("a", "first"), item("b", "second")]);
        let mut vectors = VectorStore::new();
        let generator = StubGenerator::new();

        let report = synchronize(&snap, &mut vectors, &generator, &SyncOptions::default()).await;
        assert_eq!(report.regenerated_count, 2);
        assert_eq!(report.fresh_count, 0);
        assert!(report.failed_ids.is_empty());
        assert!(vectors.contains("a") && vectors.contains("b"));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let snap = snapshot(vec![item("a", "first"), item("b", "second")]);
        let mut vectors = VectorStore::new();
        let generator = StubGenerator::new();
        let options = SyncOptions::default();

        synchronize(&snap, &mut vectors, &generator, &options).await;
        let second = synchronize(&snap, &mut vectors, &generator, &options).await;

        assert_eq!(second.regenerated_count, 0);
        assert_eq!(second.fresh_count, 2);
        assert!(second.failed_ids.is_empty());
    }

    #[tokio::test]
    async fn test_edited_record_goes_stale_and_regenerates() {
        let mut records = vec![item("a", "original")];
        let snap = snapshot(records.clone());
        let mut vectors = VectorStore::new();
        let generator = StubGenerator::new();
        let options = SyncOptions::default();

        synchronize(&snap, &mut vectors, &generator, &options).await;

        records[0].content = "edited".to_string();
        let edited = snapshot(records);
        assert_eq!(
            vector_state(&edited.records()[0], &vectors),
            VectorState::Stale
        );

        let report = synchronize(&edited, &mut vectors, &generator, &options).await;
        assert_eq!(report.regenerated_count, 1);
        assert_eq!(vectors.get("a").unwrap().semantic_text, edited.records()[0].semantic_source());
    }

    #[tokio::test]
    async fn test_partial_failure_commits_the_rest() {
        let snap = snapshot(vec![item("a", "ok"), item("b", "bad"), item("c", "ok too")]);
        let mut vectors = VectorStore::new();
        let generator = StubGenerator::failing(&["b"]);

        let report = synchronize(&snap, &mut vectors, &generator, &SyncOptions::default()).await;
        assert_eq!(report.regenerated_count, 2);
        assert_eq!(report.failed_ids, vec!["b".to_string()]);
        assert!(vectors.contains("a") && vectors.contains("c"));
        assert!(!vectors.contains("b"));

        // Failed id is retried on the next pass and recovers.
        let generator = StubGenerator::new();
        let report = synchronize(&snap, &mut vectors, &generator, &SyncOptions::default()).await;
        assert_eq!(report.regenerated_count, 1);
        assert!(vectors.contains("b"));
    }

    #[tokio::test]
    async fn test_orphaned_entries_are_pruned() {
        let snap = snapshot(vec![item("a", "kept")]);
        let mut vectors = VectorStore::new();
        vectors.upsert(VectorEntry {
            archived_date: crate::types::ArchivedDate::Active,
            id: "ghost".to_string(),
            semantic_text: "gone".to_string(),
            embedding: vec![1.0, 0.0, 0.0, 0.0],
        });

        let report =
            synchronize(&snap, &mut vectors, &StubGenerator::new(), &SyncOptions::default()).await;
        assert_eq!(report.pruned_count, 1);
        assert!(!vectors.contains("ghost"));
        assert!(vectors.contains("a"));
    }

    #[tokio::test]
    async fn test_timeout_fails_batch_and_leaves_rest_intact() {
        let snap = snapshot(vec![item("a", "slow")]);
        let mut vectors = VectorStore::new();
        let generator = StubGenerator {
            delay: Some(Duration::from_millis(200)),
            ..StubGenerator::new()
        };
        let options = SyncOptions {
            batch_size: 32,
            timeout: Some(Duration::from_millis(10)),
        };

        let report = synchronize(&snap, &mut vectors, &generator, &options).await;
        assert_eq!(report.regenerated_count, 0);
        assert_eq!(report.failed_ids, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_batching_respects_batch_size() {
        let records: Vec<Record> = (0..7).map(|i| item(&format!("r{i}"), "text")).collect();
        let snap = snapshot(records);
        let mut vectors = VectorStore::new();
        let generator = StubGenerator::new();
        let options = SyncOptions {
            batch_size: 3,
            timeout: None,
        };

        let report = synchronize(&snap, &mut vectors, &generator, &options).await;
        assert_eq!(report.regenerated_count, 7);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3); // 3 + 3 + 1
    }

    #[tokio::test]
    async fn test_archived_records_are_not_regenerated() {
        let active = item("a", "active");
        let archived = crate::temporal::archive(
            &item("b", "archived"),
            chrono::Utc::now().date_naive(),
        )
        .unwrap();
        let snap = snapshot(vec![active, archived]);
        let mut vectors = VectorStore::new();

        let report =
            synchronize(&snap, &mut vectors, &StubGenerator::new(), &SyncOptions::default()).await;
        assert_eq!(report.regenerated_count, 1);
        assert!(vectors.contains("a"));
        // Archived record's entry is simply absent, not failed.
        assert!(report.failed_ids.is_empty());
    }
}
