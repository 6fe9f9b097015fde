//! Durable state of collection migration runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Collection, MigrationStatus};

/// Latest run recorded for one collection.
///
/// `IN_PROGRESS` while a run holds the collection. A process that dies
/// mid-run leaves the row at `IN_PROGRESS`, but its claim is gone, so the
/// next run can take the collection over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub collection: Collection,
    pub run_id: String,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn started(collection: Collection, run_id: &str) -> Self {
        Self {
            collection,
            run_id: run_id.to_string(),
            status: MigrationStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
