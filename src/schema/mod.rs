//! Bootstrap of the engine's own tables with version tracking.
//!
//! Schema migrations are:
//! - **Idempotent**: `IF NOT EXISTS` everywhere - required for safe retries
//! - **Forward-only**: no down migrations
//! - **Version-tracked**: version stored in the single-row `schema_version` table
//!
//! These create the fixed target collections and bookkeeping tables; they are
//! unrelated to the catalog data migration itself.

mod m001_documents;
mod m002_migration_state;
mod m003_run_state;
mod traits;

pub use m001_documents::M001Documents;
pub use m002_migration_state::M002MigrationState;
pub use m003_run_state::M003RunState;
pub use traits::{Register, SchemaMigration};

use crate::db::{fetch_one, DbClient, SqlExecutor, SqlValue};
use crate::error::AppError;

/// Result of a bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapResult {
    /// Schema version before bootstrap ran.
    pub previous_version: u32,
    /// Schema version after bootstrap ran.
    pub current_version: u32,
    /// List of migration IDs that were applied.
    pub applied_migrations: Vec<String>,
}

/// All schema migrations in version order.
pub fn create_register() -> Register {
    Register::new()
        .register(M001Documents)
        .register(M002MigrationState)
        .register(M003RunState)
}

/// Apply all pending schema migrations.
pub async fn bootstrap<C: DbClient>(client: &C) -> Result<BootstrapResult, AppError> {
    ensure_schema_version_table(client).await?;

    let previous_version = get_schema_version(client).await?;
    let register = create_register();

    let (current_version, applied_migrations) = register
        .run_pending(client, previous_version, |version, id| {
            update_schema_version(client, version, id)
        })
        .await?;

    Ok(BootstrapResult {
        previous_version,
        current_version,
        applied_migrations,
    })
}

/// SQL to create the schema_version table.
const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
    version INTEGER NOT NULL DEFAULT 0,
    applied_migrations TEXT[] NOT NULL DEFAULT '{}',
    last_applied_at TIMESTAMPTZ DEFAULT NOW()
);

-- Ensure exactly one row exists
INSERT INTO schema_version (id, version)
VALUES (1, 0)
ON CONFLICT (id) DO NOTHING;
"#;

async fn ensure_schema_version_table<C: SqlExecutor>(client: &C) -> Result<(), AppError> {
    client.execute_sql(CREATE_SCHEMA_VERSION_TABLE).await
}

/// Returns 0 for a fresh database.
async fn get_schema_version<C: SqlExecutor>(client: &C) -> Result<u32, AppError> {
    let row = fetch_one(
        client,
        "SELECT version::bigint AS version FROM schema_version WHERE id = 1",
        vec![],
    )
    .await?;

    Ok(row
        .and_then(|r| r.get::<i64>("version").ok())
        .unwrap_or(0) as u32)
}

async fn update_schema_version<C: SqlExecutor>(
    client: &C,
    version: u32,
    migration_id: &'static str,
) -> Result<(), AppError> {
    client
        .execute_params(
            "UPDATE schema_version
             SET version = $1::bigint,
                 applied_migrations = array_append(applied_migrations, $2::text),
                 last_applied_at = NOW()
             WHERE id = 1",
            vec![SqlValue::Int(version as i64), SqlValue::from(migration_id)],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_versions_are_increasing() {
        let register = create_register();
        let versions: Vec<u32> = register.iter().map(|m| m.version()).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_register_ids_are_unique() {
        let register = create_register();
        let mut ids: Vec<&str> = register.iter().map(|m| m.id()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
