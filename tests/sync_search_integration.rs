//! Synchronize against a deterministic generator, persist the companion
//! store, and search it — the full pipeline over real files.

use async_trait::async_trait;
use semgraph::embedding::{
    EmbeddingGenerator, EmbeddingRequest, EmbeddingResult, GenerationError, SyncOptions,
    VectorStore,
};
use semgraph::store::writer::append_record;
use semgraph::types::{parse_timestamp, Record, SearchFilter, Stance};
use semgraph::{companion_path, synchronize, Header, Snapshot};

/// Embeds each text into a fixed-dimension vector derived from its bytes.
/// Same text, same vector — which is all synchronization cares about.
struct HashingGenerator;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = [0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += f32::from(b) / 255.0;
    }
    v.to_vec()
}

#[async_trait]
impl EmbeddingGenerator for HashingGenerator {
    async fn embed_batch(
        &self,
        batch: &[EmbeddingRequest],
    ) -> Result<Vec<EmbeddingResult>, GenerationError> {
        Ok(batch
            .iter()
            .map(|request| EmbeddingResult {
                id: request.id.clone(),
                outcome: Ok(hash_embed(&request.text)),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

fn item(id: &str, content: &str, stance: Stance, domain: Option<&str>) -> Record {
    let ts = parse_timestamp("2024-01-15T10:00:00Z").unwrap();
    let mut record = Record::new_item(id, content, stance, ts);
    record.certainty = 0.9;
    record.perspective = "me".to_string();
    record.domain = domain.map(str::to_string);
    record
}

#[tokio::test]
async fn test_sync_then_search_over_disk() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("graph.tsv");
    let header = Header::canonical();

    append_record(&graph, &header, &item("boil", "water boils at 100C", Stance::Fact, Some("science"))).unwrap();
    append_record(&graph, &header, &item("tea", "tea tastes better at 80C", Stance::Opinion, Some("kitchen"))).unwrap();
    append_record(&graph, &header, &item("run", "run a marathon", Stance::Aspiration, None)).unwrap();

    let (snapshot, _) = Snapshot::load(&graph).unwrap();
    let semantics = companion_path(&graph);
    let mut vectors = VectorStore::load(&semantics).unwrap();
    assert!(vectors.is_empty());

    let report = synchronize(&snapshot, &mut vectors, &HashingGenerator, &SyncOptions::default()).await;
    assert_eq!(report.regenerated_count, 3);
    assert!(report.failed_ids.is_empty());
    vectors.save(&semantics).unwrap();

    // Query with the exact embedding of one record: it must rank first
    // with score 1.0.
    let reloaded = VectorStore::load(&semantics).unwrap();
    assert_eq!(reloaded.len(), 3);
    let query = hash_embed(&snapshot.get("boil").unwrap().semantic_source());

    let hits = semgraph::search(&snapshot, &reloaded, &query, &SearchFilter::default(), 10).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].record.id, "boil");
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    // Domain filter narrows to the one kitchen record.
    let filter = SearchFilter::default().with_domain("kitchen");
    let hits = semgraph::search(&snapshot, &reloaded, &query, &filter, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "tea");
}

#[tokio::test]
async fn test_second_pass_is_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("graph.tsv");
    let header = Header::canonical();
    append_record(&graph, &header, &item("a", "stable content", Stance::Fact, None)).unwrap();

    let (snapshot, _) = Snapshot::load(&graph).unwrap();
    let semantics = companion_path(&graph);

    let mut vectors = VectorStore::load(&semantics).unwrap();
    synchronize(&snapshot, &mut vectors, &HashingGenerator, &SyncOptions::default()).await;
    vectors.save(&semantics).unwrap();
    let first = std::fs::read_to_string(&semantics).unwrap();

    // Reload from disk; nothing changed, so nothing regenerates and the
    // file content stays byte-identical.
    let mut vectors = VectorStore::load(&semantics).unwrap();
    let report =
        synchronize(&snapshot, &mut vectors, &HashingGenerator, &SyncOptions::default()).await;
    assert_eq!(report.regenerated_count, 0);
    assert_eq!(report.fresh_count, 1);
    vectors.save(&semantics).unwrap();

    assert_eq!(std::fs::read_to_string(&semantics).unwrap(), first);
}

#[tokio::test]
async fn test_edit_then_sync_updates_entry_and_search_follows() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("graph.tsv");
    let header = Header::canonical();
    append_record(&graph, &header, &item("a", "first version", Stance::Fact, None)).unwrap();

    let (snapshot, _) = Snapshot::load(&graph).unwrap();
    let semantics = companion_path(&graph);
    let mut vectors = VectorStore::load(&semantics).unwrap();
    synchronize(&snapshot, &mut vectors, &HashingGenerator, &SyncOptions::default()).await;

    // Rewrite the store with changed content for the same id.
    let mut edited = snapshot.clone();
    let mut record = snapshot.get("a").unwrap().clone();
    record.content = "second version".to_string();
    edited.replace(record).unwrap();

    let report =
        synchronize(&edited, &mut vectors, &HashingGenerator, &SyncOptions::default()).await;
    assert_eq!(report.regenerated_count, 1);

    let query = hash_embed(&edited.get("a").unwrap().semantic_source());
    let hits = semgraph::search(&edited, &vectors, &query, &SearchFilter::default(), 10).unwrap();
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn test_keyword_fallback_needs_no_vectors() {
    let records = vec![
        item("a", "water boils at 100C", Stance::Fact, Some("science")),
        item("b", "completely unrelated", Stance::Fact, None),
    ];
    let snapshot = Snapshot::from_records(Header::canonical(), records);

    let hits = semgraph::keyword_search(&snapshot, "BOILS", &SearchFilter::default(), 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "a");
}
