//! Data quality report over a batch of source records.

use serde::{Deserialize, Serialize};

/// Issues recorded for a single source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssues {
    /// Source primary key of the record.
    pub record_id: i64,
    pub issues: Vec<String>,
}

/// Completeness and consistency of a batch of source records.
///
/// Both scores lie in `0.0..=1.0` and are exactly `0.0` for an empty batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    /// `valid_records / total_records`.
    pub completeness_score: f64,
    /// Share of records without any recorded issue, advisory ones included.
    pub consistency_score: f64,
    pub issues: Vec<RecordIssues>,
}

impl DataQualityReport {
    /// Builds a report from raw tallies.
    ///
    /// `clean_records` is the number of records with no issue at all.
    pub fn from_counts(
        total_records: u64,
        valid_records: u64,
        clean_records: u64,
        issues: Vec<RecordIssues>,
    ) -> Self {
        Self {
            total_records,
            valid_records,
            invalid_records: total_records.saturating_sub(valid_records),
            completeness_score: ratio(valid_records, total_records),
            consistency_score: ratio(clean_records, total_records),
            issues,
        }
    }

    pub fn empty() -> Self {
        Self::from_counts(0, 0, 0, Vec::new())
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part.min(total) as f64) / (total as f64)
}
