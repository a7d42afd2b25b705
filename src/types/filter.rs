//! Structural search filter
//!
//! Pre-filters the candidate set before any similarity scoring. The default
//! excludes archived records; everything else is opt-in.

use super::record::{Record, Stance};
use serde::Serialize;
use std::collections::HashSet;

/// Structural filter applied to records before ranking.
#[derive(Debug, Clone, Serialize)]
pub struct SearchFilter {
    /// Exclude archived records. On by default.
    pub active_only: bool,
    /// Exact domain match, when set.
    pub domain: Option<String>,
    /// Stance membership, when set.
    pub stances: Option<HashSet<Stance>>,
    /// Minimum certainty (inclusive), when set.
    pub min_certainty: Option<f64>,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            active_only: true,
            domain: None,
            stances: None,
            min_certainty: None,
        }
    }
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_archived(mut self) -> Self {
        self.active_only = false;
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_stances<I: IntoIterator<Item = Stance>>(mut self, stances: I) -> Self {
        self.stances = Some(stances.into_iter().collect());
        self
    }

    pub fn with_min_certainty(mut self, min: f64) -> Self {
        self.min_certainty = Some(min);
        self
    }

    /// Whether a record passes every configured predicate.
    pub fn matches(&self, record: &Record) -> bool {
        if self.active_only && !record.archived_date.is_active() {
            return false;
        }
        if let Some(ref domain) = self.domain {
            if record.domain.as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if let Some(ref stances) = self.stances {
            if !stances.contains(&record.stance) {
                return false;
            }
        }
        if let Some(min) = self.min_certainty {
            if record.certainty < min {
                return false;
            }
        }
        true
    }
}
