//! Link index: single-hop adjacency over link records
//!
//! Built once per snapshot. Maps each id to the link records where it
//! appears as `ref1` or `ref2`, tagged with direction and relation, for
//! relation- and weight-filtered neighbor lookup. Dangling references are
//! integrity warnings, not failures — a link may legitimately outlive its
//! target's active life.

use crate::store::validation::IntegrityWarning;
use crate::store::Snapshot;
use crate::types::Record;
use serde::Serialize;
use std::collections::HashMap;

/// Recommended relation vocabulary. Open-ended: anything else is accepted,
/// these are just the conventional values.
pub mod relations {
    pub const SUPPORTS: &str = "supports";
    pub const CONTRADICTS: &str = "contradicts";
    pub const RELATES_TO: &str = "relates_to";
    pub const DERIVED_FROM: &str = "derived_from";
    pub const SUPERSEDES: &str = "supersedes";
    pub const ANSWERS: &str = "answers";
}

/// Which side of the link the indexed id sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// Indexed id is `ref1`; the neighbor is `ref2`.
    Outgoing,
    /// Indexed id is `ref2`; the neighbor is `ref1`.
    Incoming,
}

/// One adjacency entry: a link record seen from one of its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEdge {
    /// Id of the link record itself.
    pub link_id: String,
    /// Id on the other end.
    pub neighbor: String,
    pub direction: LinkDirection,
    pub relation: String,
    pub weight: f64,
}

/// Adjacency structure over the link records of one snapshot.
#[derive(Debug, Default)]
pub struct LinkIndex {
    edges: HashMap<String, Vec<LinkEdge>>,
    link_count: usize,
}

impl LinkIndex {
    /// Index every link record in the snapshot. Links missing refs were
    /// already rejected at validation; anything present here is complete.
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut index = Self::default();
        for record in snapshot.records().iter().filter(|r| r.is_link()) {
            let (Some(ref1), Some(ref2)) = (record.ref1.as_deref(), record.ref2.as_deref())
            else {
                continue;
            };
            let relation = record.relation.clone().unwrap_or_default();
            index.link_count += 1;

            index.edges.entry(ref1.to_string()).or_default().push(LinkEdge {
                link_id: record.id.clone(),
                neighbor: ref2.to_string(),
                direction: LinkDirection::Outgoing,
                relation: relation.clone(),
                weight: record.weight,
            });
            index.edges.entry(ref2.to_string()).or_default().push(LinkEdge {
                link_id: record.id.clone(),
                neighbor: ref1.to_string(),
                direction: LinkDirection::Incoming,
                relation,
                weight: record.weight,
            });
        }
        tracing::debug!(links = index.link_count, "link index built");
        index
    }

    /// All edges touching an id.
    pub fn neighbors(&self, id: &str) -> &[LinkEdge] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Single-hop lookup filtered by relation and/or minimum weight.
    pub fn neighbors_filtered(
        &self,
        id: &str,
        relation: Option<&str>,
        min_weight: Option<f64>,
    ) -> Vec<&LinkEdge> {
        self.neighbors(id)
            .iter()
            .filter(|edge| relation.is_none_or(|r| edge.relation == r))
            .filter(|edge| min_weight.is_none_or(|w| edge.weight >= w))
            .collect()
    }

    /// Number of link records indexed.
    pub const fn link_count(&self) -> usize {
        self.link_count
    }

    /// Integrity pass: references to nonexistent ids are dangling,
    /// references to archived ids are flagged for the historical record.
    /// Both are warnings, never hard failures.
    pub fn dangling(&self, snapshot: &Snapshot) -> Vec<IntegrityWarning> {
        let mut warnings = Vec::new();
        for record in snapshot.records().iter().filter(|r| r.is_link()) {
            for (field, target) in link_targets(record) {
                match snapshot.get(target) {
                    None => warnings.push(IntegrityWarning::DanglingLinkReference {
                        link_id: record.id.clone(),
                        field,
                        target: target.to_string(),
                    }),
                    Some(existing) if !existing.archived_date.is_active() => {
                        warnings.push(IntegrityWarning::ArchivedLinkTarget {
                            link_id: record.id.clone(),
                            field,
                            target: target.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        warnings
    }
}

fn link_targets(record: &Record) -> impl Iterator<Item = (&'static str, &str)> {
    record
        .ref1
        .as_deref()
        .map(|t| ("ref1", t))
        .into_iter()
        .chain(record.ref2.as_deref().map(|t| ("ref2", t)))
}
