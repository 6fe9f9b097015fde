//! Cross-process claims on collections for the duration of a run.
//!
//! The PostgreSQL claim is a set of transaction-scoped advisory locks held
//! on one pooled connection until the run ends. If the process dies, the
//! session ends with it and the locks go away. The `migration_runs` table
//! only records status for operators; it is never used for exclusion.

use async_trait::async_trait;

use crate::db::postgres::{PostgresClient, PostgresTransaction};
use crate::db::{fetch_all, fetch_one, DbClient, SqlExecutor, SqlValue, Transaction};
use crate::error::AppError;
use crate::models::{Collection, MigrationStatus, RunState};

#[async_trait]
pub trait RunLock: Send + Sync {
    /// Claims every collection in `collections` for `run_id`, or none of them.
    ///
    /// # Errors
    ///
    /// `RunInProgress` naming the first collection held by another run.
    async fn claim(
        &self,
        run_id: &str,
        collections: &[Collection],
    ) -> Result<Box<dyn RunClaim>, AppError>;

    /// Latest recorded run per collection.
    async fn states(&self) -> Result<Vec<RunState>, AppError>;
}

/// A held claim. Dropping it without [`release`](RunClaim::release) still
/// frees the collections but leaves their status at `IN_PROGRESS`.
#[async_trait]
pub trait RunClaim: Send + Sync {
    async fn release(self: Box<Self>, status: MigrationStatus) -> Result<(), AppError>;
}

/// Advisory-lock namespace shared by every catalog-migrate process.
const LOCK_NAMESPACE: &str = "catalog_migrate.run";

/// Run claims in the target database.
#[derive(Clone)]
pub struct PostgresRunLock {
    client: PostgresClient,
}

impl PostgresRunLock {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn try_lock(txn: &PostgresTransaction, collection: Collection) -> Result<bool, AppError> {
        let row = fetch_one(
            txn,
            "SELECT pg_try_advisory_xact_lock(hashtext($1), hashtext($2)) AS acquired",
            vec![LOCK_NAMESPACE.into(), collection.as_str().into()],
        )
        .await?;
        match row {
            Some(row) => row.get("acquired"),
            None => Ok(false),
        }
    }

    async fn mark_started(&self, run_id: &str, collections: &[Collection]) -> Result<(), AppError> {
        for collection in collections {
            let state = RunState::started(*collection, run_id);
            self.client
                .execute_params(
                    "INSERT INTO migration_runs (collection, run_id, status, started_at, finished_at)
                     VALUES ($1, $2, $3, $4, NULL)
                     ON CONFLICT (collection) DO UPDATE
                     SET run_id = EXCLUDED.run_id,
                         status = EXCLUDED.status,
                         started_at = EXCLUDED.started_at,
                         finished_at = NULL",
                    vec![
                        state.collection.as_str().into(),
                        state.run_id.as_str().into(),
                        state.status.to_string().into(),
                        SqlValue::Timestamp(state.started_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunLock for PostgresRunLock {
    async fn claim(
        &self,
        run_id: &str,
        collections: &[Collection],
    ) -> Result<Box<dyn RunClaim>, AppError> {
        let txn = self.client.begin().await?;

        for collection in collections {
            if !Self::try_lock(&txn, *collection).await? {
                txn.rollback().await?;
                return Err(AppError::RunInProgress {
                    collection: *collection,
                });
            }
        }

        if let Err(e) = self.mark_started(run_id, collections).await {
            txn.rollback().await?;
            return Err(e);
        }

        Ok(Box::new(PostgresRunClaim {
            client: self.client.clone(),
            txn,
            run_id: run_id.to_string(),
            collections: collections.to_vec(),
        }))
    }

    async fn states(&self) -> Result<Vec<RunState>, AppError> {
        let rows = fetch_all(
            &self.client,
            "SELECT collection, run_id, status, started_at, finished_at
             FROM migration_runs ORDER BY started_at DESC",
            vec![],
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RunState {
                    collection: row.get("collection")?,
                    run_id: row.get("run_id")?,
                    status: row.get("status")?,
                    started_at: row.get("started_at")?,
                    finished_at: row.get_opt("finished_at")?,
                })
            })
            .collect()
    }
}

/// Advisory locks held by the open transaction until release.
struct PostgresRunClaim {
    client: PostgresClient,
    txn: PostgresTransaction,
    run_id: String,
    collections: Vec<Collection>,
}

#[async_trait]
impl RunClaim for PostgresRunClaim {
    async fn release(self: Box<Self>, status: MigrationStatus) -> Result<(), AppError> {
        let names: Vec<String> = self
            .collections
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();

        let recorded = self
            .client
            .execute_params(
                "UPDATE migration_runs SET status = $1, finished_at = NOW()
                 WHERE run_id = $2 AND collection = ANY(string_to_array($3, ','))",
                vec![
                    status.to_string().into(),
                    self.run_id.as_str().into(),
                    names.join(",").into(),
                ],
            )
            .await;

        // Committing ends the transaction and frees the locks either way
        self.txn.commit().await?;
        recorded.map(|_| ())
    }
}
