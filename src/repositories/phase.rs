//! Durable storage for the migration phase record.

use async_trait::async_trait;

use crate::db::postgres::PostgresClient;
use crate::db::{fetch_all, fetch_one, DbClient, Row, SqlExecutor, SqlValue, Transaction};
use crate::error::AppError;
use crate::models::{MigrationPhase, PhaseRecord, PhaseTransition};

/// Persistence for the single phase record and its audit trail.
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Returns the stored record, or `None` before first bootstrap.
    async fn load(&self) -> Result<Option<PhaseRecord>, AppError>;

    /// Replaces the record; the transition, if any, is appended atomically.
    async fn save(
        &self,
        record: &PhaseRecord,
        transition: Option<&PhaseTransition>,
    ) -> Result<(), AppError>;

    /// Audit trail, oldest first.
    async fn transitions(&self) -> Result<Vec<PhaseTransition>, AppError>;
}

/// Phase record kept in the target database.
#[derive(Clone)]
pub struct PostgresPhaseStore {
    client: PostgresClient,
}

impl PostgresPhaseStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    fn parse_phase(row: &Row, column: &str) -> Result<MigrationPhase, AppError> {
        let raw: String = row.get(column)?;
        raw.parse().map_err(AppError::Internal)
    }
}

#[async_trait]
impl PhaseStore for PostgresPhaseStore {
    async fn load(&self) -> Result<Option<PhaseRecord>, AppError> {
        let Some(row) = fetch_one(
            &self.client,
            "SELECT phase, entered_at FROM migration_phase WHERE id = 1",
            vec![],
        )
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(PhaseRecord {
            phase: Self::parse_phase(&row, "phase")?,
            entered_at: row.get("entered_at")?,
        }))
    }

    async fn save(
        &self,
        record: &PhaseRecord,
        transition: Option<&PhaseTransition>,
    ) -> Result<(), AppError> {
        let txn = self.client.begin().await?;

        let written = async {
            txn.execute_params(
                "INSERT INTO migration_phase (id, phase, entered_at) VALUES (1, $1, $2)
                 ON CONFLICT (id) DO UPDATE
                 SET phase = EXCLUDED.phase, entered_at = EXCLUDED.entered_at",
                vec![
                    record.phase.as_str().into(),
                    SqlValue::Timestamp(record.entered_at),
                ],
            )
            .await?;

            if let Some(t) = transition {
                txn.execute_params(
                    "INSERT INTO phase_transitions (from_phase, to_phase, reason, transitioned_at)
                     VALUES ($1, $2, $3, $4)",
                    vec![
                        t.from.as_str().into(),
                        t.to.as_str().into(),
                        t.reason.as_str().into(),
                        SqlValue::Timestamp(t.at),
                    ],
                )
                .await?;
            }
            Ok::<_, AppError>(())
        }
        .await;

        match written {
            Ok(()) => txn.commit().await,
            Err(e) => {
                txn.rollback().await?;
                Err(e)
            }
        }
    }

    async fn transitions(&self) -> Result<Vec<PhaseTransition>, AppError> {
        let rows = fetch_all(
            &self.client,
            "SELECT from_phase, to_phase, reason, transitioned_at
             FROM phase_transitions ORDER BY seq",
            vec![],
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PhaseTransition {
                    from: Self::parse_phase(row, "from_phase")?,
                    to: Self::parse_phase(row, "to_phase")?,
                    at: row.get("transitioned_at")?,
                    reason: row.get("reason")?,
                })
            })
            .collect()
    }
}
