//! Data quality assessment of source records.
//!
//! A record is valid when it has a natural key, a price, and non-negative
//! stock. Advisory issues (inconsistent timestamps, unknown owner) are
//! reported without making the record invalid, so they only lower the
//! consistency score.

use std::collections::HashSet;

use crate::models::{DataQualityReport, RecordIssues, SourceRecord};

/// Streaming assessor; feed records page by page, then [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct QualityAccumulator {
    known_owners: Option<HashSet<i64>>,
    total: u64,
    valid: u64,
    clean: u64,
    counts_only: bool,
    issues: Vec<RecordIssues>,
}

impl QualityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also flags records whose owner is not in `owners`.
    ///
    /// An empty set disables the check; a source without a stores table
    /// would otherwise flag every record.
    pub fn with_known_owners(owners: HashSet<i64>) -> Self {
        Self {
            known_owners: (!owners.is_empty()).then_some(owners),
            ..Self::default()
        }
    }

    /// Keeps scores and counts but no per-record issues, for scoring a
    /// whole collection during a migration.
    pub fn counting() -> Self {
        Self {
            counts_only: true,
            ..Self::default()
        }
    }

    /// Records with at least one issue, advisory or disqualifying.
    pub fn flagged(&self) -> u64 {
        self.total - self.clean
    }

    pub fn observe(&mut self, record: &SourceRecord) {
        let mut issues = disqualifying_issues(record);
        let valid = issues.is_empty();
        issues.extend(self.advisory_issues(record));

        self.total += 1;
        if valid {
            self.valid += 1;
        }
        if issues.is_empty() {
            self.clean += 1;
        } else if !self.counts_only {
            self.issues.push(RecordIssues {
                record_id: record.id,
                issues,
            });
        }
    }

    pub fn observe_all<'a>(&mut self, records: impl IntoIterator<Item = &'a SourceRecord>) {
        for record in records {
            self.observe(record);
        }
    }

    pub fn finish(self) -> DataQualityReport {
        DataQualityReport::from_counts(self.total, self.valid, self.clean, self.issues)
    }

    fn advisory_issues(&self, record: &SourceRecord) -> Vec<String> {
        let mut issues = Vec::new();

        if let (Some(created), Some(updated)) = (record.created_at, record.updated_at) {
            if updated < created {
                issues.push("updated_at precedes created_at".to_string());
            }
        }

        if let (Some(known), Some(owner)) = (&self.known_owners, record.owner_id) {
            if !known.contains(&owner) {
                issues.push(format!("unknown owner {}", owner));
            }
        }

        issues
    }
}

fn disqualifying_issues(record: &SourceRecord) -> Vec<String> {
    let mut issues = Vec::new();

    if record.trimmed_key().is_none() {
        issues.push("missing natural_key".to_string());
    }
    match record.price {
        None => issues.push("missing price".to_string()),
        Some(p) if !p.is_finite() => issues.push(format!("non-numeric price ({})", p)),
        Some(_) => {}
    }
    if let Some(stock) = record.stock.filter(|s| *s < 0) {
        issues.push(format!("negative stock ({})", stock));
    }

    issues
}

/// Scores a finite batch of records.
pub fn assess<'a>(records: impl IntoIterator<Item = &'a SourceRecord>) -> DataQualityReport {
    let mut acc = QualityAccumulator::new();
    acc.observe_all(records);
    acc.finish()
}
