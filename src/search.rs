//! Similarity search engine
//!
//! Ranks stored vectors by cosine similarity to a query vector after a
//! structural pre-filter. Scoring is embarrassingly parallel across
//! candidates; the final ranking is deterministic regardless of scoring
//! order: score descending, ties broken by record timestamp descending,
//! then id.

use crate::embedding::VectorStore;
use crate::store::Snapshot;
use crate::types::{Record, SearchFilter};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("query vector dimension {query} does not match stored dimension {stored}")]
    DimensionMismatch { query: usize, stored: usize },

    #[error("query vector is empty")]
    EmptyQuery,
}

/// One ranked result: the matched record and its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: Record,
    pub score: f64,
}

/// Rank candidate records by similarity to `query`.
///
/// Candidates are vector entries whose record passes `filter`. A `top_k`
/// larger than the candidate count returns every candidate — no padding,
/// no error. Mismatched dimensionality anywhere in the candidate set fails
/// the call rather than producing a degraded score.
pub fn search(
    snapshot: &Snapshot,
    vectors: &VectorStore,
    query: &[f32],
    filter: &SearchFilter,
    top_k: usize,
) -> Result<Vec<SearchHit>, SearchError> {
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let candidates: Vec<(&Record, &[f32])> = vectors
        .iter()
        .filter_map(|entry| snapshot.get(&entry.id).map(|r| (r, entry.embedding.as_slice())))
        .filter(|(record, _)| filter.matches(record))
        .collect();

    for (record, embedding) in &candidates {
        if embedding.len() != query.len() {
            tracing::error!(
                id = %record.id,
                stored = embedding.len(),
                query = query.len(),
                "vector dimensionality mismatch"
            );
            return Err(SearchError::DimensionMismatch {
                query: query.len(),
                stored: embedding.len(),
            });
        }
    }

    let mut hits: Vec<SearchHit> = candidates
        .par_iter()
        .map(|(record, embedding)| SearchHit {
            record: (*record).clone(),
            score: cosine_similarity(query, embedding),
        })
        .collect();

    rank(&mut hits);
    hits.truncate(top_k);

    tracing::debug!(candidates = candidates.len(), returned = hits.len(), "search complete");
    Ok(hits)
}

/// Keyword fallback for stores without embeddings: case-insensitive
/// substring match over content, every hit scored 1.0, ordered by recency.
pub fn keyword_search(
    snapshot: &Snapshot,
    query: &str,
    filter: &SearchFilter,
    top_k: usize,
) -> Vec<SearchHit> {
    let needle = query.to_lowercase();
    let mut hits: Vec<SearchHit> = snapshot
        .records()
        .iter()
        .filter(|record| filter.matches(record))
        .filter(|record| record.content.to_lowercase().contains(&needle))
        .map(|record| SearchHit {
            record: record.clone(),
            score: 1.0,
        })
        .collect();

    rank(&mut hits);
    hits.truncate(top_k);
    hits
}

/// Deterministic ordering: score descending, then most recent timestamp,
/// then id.
fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}

/// Cosine similarity in [-1, 1]. A zero-norm vector on either side yields
/// 0.0 — never a division fault.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    dot / denom
}
