//! Phase state, phase audit trail and run history tables.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::db::SqlExecutor;
use crate::error::AppError;
use crate::schema::SchemaMigration;

/// Durable migration state.
pub struct M002MigrationState;

impl SchemaMigration for M002MigrationState {
    fn id(&self) -> &'static str {
        "m002_migration_state"
    }

    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Migration phase record, phase transitions and run history"
    }

    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>> {
        async move {
            // Single-row phase record; the row is created by the phase controller
            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS migration_phase (
                    id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
                    phase TEXT NOT NULL,
                    entered_at TIMESTAMPTZ NOT NULL
                );

                CREATE TABLE IF NOT EXISTS phase_transitions (
                    seq BIGSERIAL PRIMARY KEY,
                    from_phase TEXT NOT NULL,
                    to_phase TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    transitioned_at TIMESTAMPTZ NOT NULL
                );
                "#,
            )
            .await?;

            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS migration_history (
                    seq BIGSERIAL PRIMARY KEY,
                    run_id TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('collection', 'full_run', 'quality')),
                    collection TEXT,
                    recorded_at TIMESTAMPTZ NOT NULL,
                    payload JSONB NOT NULL
                );

                CREATE INDEX IF NOT EXISTS migration_history_recorded_idx
                ON migration_history (recorded_at DESC);
                "#,
            )
            .await?;

            Ok(())
        }
        .boxed()
    }
}
