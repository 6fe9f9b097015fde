//! Append-only run history.

use async_trait::async_trait;

use crate::db::postgres::PostgresClient;
use crate::db::{fetch_all, SqlExecutor, SqlValue};
use crate::error::AppError;
use crate::models::{HistoryEntry, HistoryRecord};

#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), AppError>;

    /// Most recent entries first.
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError>;
}

/// History kept in the target database's `migration_history` table.
#[derive(Clone)]
pub struct PostgresHistoryLog {
    client: PostgresClient,
}

impl PostgresHistoryLog {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HistoryLog for PostgresHistoryLog {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        let payload = serde_json::to_value(&entry.record)?;

        self.client
            .execute_params(
                "INSERT INTO migration_history (run_id, kind, collection, recorded_at, payload)
                 VALUES ($1, $2, $3, $4, $5)",
                vec![
                    entry.run_id.as_str().into(),
                    entry.record.kind().into(),
                    entry.record.collection().map(|c| c.as_str()).into(),
                    SqlValue::Timestamp(entry.recorded_at),
                    SqlValue::Json(payload),
                ],
            )
            .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        let rows = fetch_all(
            &self.client,
            "SELECT run_id, recorded_at, payload FROM migration_history
             ORDER BY recorded_at DESC, seq DESC LIMIT $1::bigint",
            vec![SqlValue::Int(limit as i64)],
        )
        .await?;

        rows.iter()
            .map(|row| {
                let record: HistoryRecord = row.get("payload")?;
                Ok(HistoryEntry {
                    run_id: row.get("run_id")?,
                    recorded_at: row.get("recorded_at")?,
                    record,
                })
            })
            .collect()
    }
}
