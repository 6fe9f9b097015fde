//! Application context providing dependency injection root.

use std::sync::Arc;

use crate::config::Config;
use crate::db::postgres::PostgresClient;
use crate::di::Context as ContextDerive;
use crate::error::{AppError, StoreKind};
use crate::repositories::{
    HistoryLog, PhaseStore, PostgresHistoryLog, PostgresPhaseStore, PostgresRunLock,
    PostgresSourceReader, PostgresTargetStore, RunLock, SourceReader, TargetStore,
};
use crate::services::{PhaseController, RollbackPolicy};

/// Read-only relational source.
pub type AppSource = Arc<dyn SourceReader>;
/// Document target store.
pub type AppTarget = Arc<dyn TargetStore>;
/// Durable phase record.
pub type AppPhaseStore = Arc<dyn PhaseStore>;
/// Run history log.
pub type AppHistory = Arc<dyn HistoryLog>;
/// Cross-process collection claims.
pub type AppRunLock = Arc<dyn RunLock>;

/// Root application context for dependency injection.
///
/// `#[derive(Context)]` generates a `FromRef` impl per field, so services
/// deriving `FromContext` resolve their dependencies from here.
#[derive(ContextDerive, Clone)]
pub struct Context {
    pub source: AppSource,
    pub target: AppTarget,
    pub history: AppHistory,
    /// Single writer of the migration phase.
    pub phase: Arc<PhaseController>,
    /// Collections with a run in progress, in any process.
    pub runs: AppRunLock,
    pub config: Arc<Config>,
}

impl Context {
    /// Builds a context over the given stores, loading (or creating) the
    /// persisted phase record.
    pub async fn new(
        source: AppSource,
        target: AppTarget,
        phase_store: AppPhaseStore,
        history: AppHistory,
        runs: AppRunLock,
        config: Config,
    ) -> Result<Self, AppError> {
        let policy = RollbackPolicy::from(&config.rollback);
        let phase = PhaseController::bootstrap(phase_store, policy).await?;

        Ok(Self {
            source,
            target,
            history,
            phase: Arc::new(phase),
            runs,
            config: Arc::new(config),
        })
    }

    /// Production context: PostgreSQL source, and the target database for
    /// documents, phase state, history and run claims.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let (source, target) = Self::create_clients(&config)?;

        Self::new(
            Arc::new(PostgresSourceReader::new(source)),
            Arc::new(PostgresTargetStore::new(target.clone())),
            Arc::new(PostgresPhaseStore::new(target.for_store(StoreKind::Phase))),
            Arc::new(PostgresHistoryLog::new(target.for_store(StoreKind::History))),
            Arc::new(PostgresRunLock::new(target.clone())),
            config,
        )
        .await
    }

    /// Connection pools for the source and target databases.
    pub fn create_clients(config: &Config) -> Result<(PostgresClient, PostgresClient), AppError> {
        let source = PostgresClient::connect(&config.source.uri, config.workers(), StoreKind::Source)?;
        // A run claim holds one target connection for the whole run
        let target = PostgresClient::connect(
            &config.target.uri,
            config.target.pool_size.max(2),
            StoreKind::Target,
        )?;
        Ok((source, target))
    }
}
