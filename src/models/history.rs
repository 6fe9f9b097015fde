//! Audit history of migration runs and quality assessments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Collection, DataQualityReport, MigrationResult};

/// What a history entry recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryRecord {
    Collection {
        collection: Collection,
        result: MigrationResult,
    },
    FullRun {
        result: MigrationResult,
    },
    Quality {
        report: DataQualityReport,
    },
}

impl HistoryRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryRecord::Collection { .. } => "collection",
            HistoryRecord::FullRun { .. } => "full_run",
            HistoryRecord::Quality { .. } => "quality",
        }
    }

    pub fn collection(&self) -> Option<Collection> {
        match self {
            HistoryRecord::Collection { collection, .. } => Some(*collection),
            _ => None,
        }
    }
}

/// One append-only history entry, keyed by run id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// ULID shared by every entry written during the same run.
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    pub record: HistoryRecord,
}

impl HistoryEntry {
    pub fn new(run_id: &str, record: HistoryRecord) -> Self {
        Self {
            run_id: run_id.to_string(),
            recorded_at: Utc::now(),
            record,
        }
    }
}
