//! Per-collection run status table.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::db::SqlExecutor;
use crate::error::AppError;
use crate::schema::SchemaMigration;

/// Latest run per collection. Exclusion between runs uses advisory locks;
/// this table only reports status.
pub struct M003RunState;

impl SchemaMigration for M003RunState {
    fn id(&self) -> &'static str {
        "m003_run_state"
    }

    fn version(&self) -> u32 {
        3
    }

    fn description(&self) -> &'static str {
        "Per-collection migration run status"
    }

    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>> {
        async move {
            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS migration_runs (
                    collection TEXT PRIMARY KEY
                        CHECK (collection IN ('brands', 'categories', 'products')),
                    run_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    started_at TIMESTAMPTZ NOT NULL,
                    finished_at TIMESTAMPTZ
                );
                "#,
            )
            .await
        }
        .boxed()
    }
}
