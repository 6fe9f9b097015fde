//! Document collections table.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::db::SqlExecutor;
use crate::error::AppError;
use crate::schema::SchemaMigration;

/// JSONB document store keyed by (collection, natural key).
pub struct M001Documents;

impl SchemaMigration for M001Documents {
    fn id(&self) -> &'static str {
        "m001_documents"
    }

    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "Document collections (brands, categories, products)"
    }

    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>> {
        async move {
            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL
                        CHECK (collection IN ('brands', 'categories', 'products')),
                    key TEXT NOT NULL,
                    source_id BIGINT NOT NULL,
                    owner_id BIGINT,
                    body JSONB NOT NULL,
                    written_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (collection, key)
                );

                CREATE INDEX IF NOT EXISTS documents_source_idx
                ON documents (collection, source_id);

                CREATE INDEX IF NOT EXISTS documents_owner_idx
                ON documents (collection, owner_id);
                "#,
            )
            .await?;

            Ok(())
        }
        .boxed()
    }
}
