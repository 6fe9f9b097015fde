//! Bootstrap migration trait and registry.

use futures::future::BoxFuture;

use crate::db::{DbClient, SqlExecutor, Transaction as _};
use crate::error::AppError;

/// A versioned, idempotent schema step for the engine's own tables.
///
/// Uses BoxFuture to avoid `'static` requirements from `#[async_trait]`.
pub trait SchemaMigration: Send + Sync {
    fn id(&self) -> &'static str;
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>>;
}

/// Ordered set of schema migrations.
pub struct Register {
    migrations: Vec<Box<dyn SchemaMigration>>,
}

impl Register {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn register(mut self, migration: impl SchemaMigration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    /// Iterate over migrations.
    pub fn iter(&self) -> impl Iterator<Item = &dyn SchemaMigration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    /// Run all pending migrations above `current_version`.
    ///
    /// Each migration runs in its own transaction and is followed by
    /// `on_applied`, so a failure part-way leaves the version pointing at the
    /// last migration that committed.
    /// Returns (new_version, applied_migration_ids).
    pub async fn run_pending<C, F, Fut>(
        &self,
        client: &C,
        current_version: u32,
        mut on_applied: F,
    ) -> Result<(u32, Vec<String>), AppError>
    where
        C: DbClient,
        F: FnMut(u32, &'static str) -> Fut,
        Fut: std::future::Future<Output = Result<(), AppError>>,
    {
        let mut applied = vec![];
        let mut new_version = current_version;

        for migration in &self.migrations {
            if migration.version() <= current_version {
                continue;
            }

            tracing::info!(
                "Applying schema migration {} (v{}): {}",
                migration.id(),
                migration.version(),
                migration.description()
            );

            let txn = client.begin().await?;
            match migration.up(&txn).await {
                Ok(()) => txn.commit().await?,
                Err(e) => {
                    tracing::error!("Schema migration {} failed: {}", migration.id(), e);
                    txn.rollback().await?;
                    return Err(e);
                }
            }

            on_applied(migration.version(), migration.id()).await?;
            new_version = migration.version();
            applied.push(migration.id().to_string());
        }

        Ok((new_version, applied))
    }
}

impl Default for Register {
    fn default() -> Self {
        Self::new()
    }
}
