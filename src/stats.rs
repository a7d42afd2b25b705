//! Store statistics

use crate::store::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counts over one snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub links: usize,
    pub avg_certainty: f64,
    pub by_stance: BTreeMap<String, usize>,
    pub by_domain: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, usize>,
}

/// Walk the snapshot once and tally everything.
pub fn collect(snapshot: &Snapshot) -> StoreStats {
    let mut stats = StoreStats::default();
    let mut certainty_sum = 0.0;

    for record in snapshot.records() {
        stats.total += 1;
        if record.archived_date.is_active() {
            stats.active += 1;
        } else {
            stats.archived += 1;
        }
        if record.is_link() {
            stats.links += 1;
        }

        *stats
            .by_stance
            .entry(record.stance_token().to_string())
            .or_default() += 1;
        let domain = record.domain.as_deref().unwrap_or("(none)");
        *stats.by_domain.entry(domain.to_string()).or_default() += 1;
        *stats
            .by_kind
            .entry(record.kind.as_str().to_string())
            .or_default() += 1;

        certainty_sum += record.certainty;
    }

    if stats.total > 0 {
        #[allow(clippy::cast_precision_loss)]
        {
            stats.avg_certainty = certainty_sum / stats.total as f64;
        }
    }
    stats
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total entries:    {}", self.total)?;
        writeln!(f, "  Active:         {}", self.active)?;
        writeln!(f, "  Archived:       {}", self.archived)?;
        writeln!(f, "  Links:          {}", self.links)?;
        writeln!(f, "Avg certainty:    {:.2}", self.avg_certainty)?;

        writeln!(f, "\n--- By Stance ---")?;
        let mut stances: Vec<_> = self.by_stance.iter().collect();
        stances.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (stance, count) in stances {
            writeln!(f, "  {stance:<15} {count}")?;
        }

        writeln!(f, "\n--- Top Domains ---")?;
        let mut domains: Vec<_> = self.by_domain.iter().collect();
        domains.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (domain, count) in domains.iter().take(10) {
            writeln!(f, "  {domain:<20} {count}")?;
        }
        Ok(())
    }
}
