//! Migration run outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::Collection;

/// Lifecycle status of a migration run or collection sub-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MigrationStatus::Pending => "PENDING",
            MigrationStatus::InProgress => "IN_PROGRESS",
            MigrationStatus::Completed => "COMPLETED",
            MigrationStatus::Failed => "FAILED",
            MigrationStatus::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

/// Outcome of one collection migration, or of a full run.
///
/// Created once when the run finishes and never modified afterwards.
/// `records_migrated` counts inserted or changed documents only; records
/// already present and unchanged count as neither migrated nor failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub status: MigrationStatus,
    pub records_migrated: u64,
    pub records_failed: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
    pub summary: BTreeMap<String, JsonValue>,
}

impl MigrationResult {
    /// Combines per-collection results into the run-level result.
    ///
    /// The run fails if any collection failed. Errors keep their order and are
    /// prefixed with the collection they came from.
    pub fn aggregate(
        results: &BTreeMap<Collection, MigrationResult>,
        duration_seconds: f64,
    ) -> Self {
        let status = if results
            .values()
            .any(|r| r.status == MigrationStatus::Failed)
        {
            MigrationStatus::Failed
        } else {
            MigrationStatus::Completed
        };

        let mut errors = Vec::new();
        let mut summary = BTreeMap::new();
        for (collection, result) in results {
            errors.extend(
                result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", collection, e)),
            );
            summary.insert(
                format!("{}_status", collection),
                JsonValue::String(result.status.to_string()),
            );
        }
        summary.insert(
            "collections".to_string(),
            JsonValue::from(results.keys().map(|c| c.as_str()).collect::<Vec<_>>()),
        );

        Self {
            status,
            records_migrated: results.values().map(|r| r.records_migrated).sum(),
            records_failed: results.values().map(|r| r.records_failed).sum(),
            duration_seconds,
            errors,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: MigrationStatus, migrated: u64, failed: u64) -> MigrationResult {
        MigrationResult {
            status,
            records_migrated: migrated,
            records_failed: failed,
            duration_seconds: 0.5,
            errors: (0..failed).map(|i| format!("error {}", i)).collect(),
            summary: BTreeMap::new(),
        }
    }

    #[test]
    fn test_aggregate_sums_counts() {
        let mut results = BTreeMap::new();
        results.insert(Collection::Brands, result(MigrationStatus::Completed, 3, 0));
        results.insert(Collection::Products, result(MigrationStatus::Completed, 10, 2));

        let total = MigrationResult::aggregate(&results, 2.0);
        assert_eq!(total.status, MigrationStatus::Completed);
        assert_eq!(total.records_migrated, 13);
        assert_eq!(total.records_failed, 2);
        assert_eq!(total.errors, vec!["products: error 0", "products: error 1"]);
    }

    #[test]
    fn test_aggregate_fails_if_any_collection_failed() {
        let mut results = BTreeMap::new();
        results.insert(Collection::Brands, result(MigrationStatus::Failed, 0, 0));
        results.insert(Collection::Products, result(MigrationStatus::Completed, 1, 0));

        let total = MigrationResult::aggregate(&results, 1.0);
        assert_eq!(total.status, MigrationStatus::Failed);
        assert_eq!(total.summary["brands_status"], "FAILED");
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&MigrationStatus::RolledBack).unwrap();
        assert_eq!(json, "\"ROLLED_BACK\"");
    }
}
