//! Guard against overlapping runs on the same collection.
//!
//! Claims go through the durable [`RunLock`](crate::repositories::RunLock),
//! so separate processes sharing a target database exclude each other.

use tracing::{info, warn};

use crate::context::{AppRunLock, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{Collection, MigrationStatus, RunState};
use crate::repositories::RunClaim;

#[derive(FromContext, Clone)]
pub struct RunRegistry {
    lock: AppRunLock,
}

impl RunRegistry {
    /// Claims every collection in `collections` for `run_id`, or none of them.
    pub async fn begin(
        &self,
        run_id: &str,
        collections: &[Collection],
    ) -> Result<RunGuard, AppError> {
        let claim = self.lock.claim(run_id, collections).await?;
        info!(%run_id, ?collections, "Claimed collections");

        Ok(RunGuard {
            claim: Some(claim),
            run_id: run_id.to_string(),
        })
    }

    /// Latest run per collection.
    pub async fn states(&self) -> Result<Vec<RunState>, AppError> {
        self.lock.states().await
    }
}

/// Held for the duration of a run.
///
/// Dropping the guard frees the collections without recording a final status.
pub struct RunGuard {
    claim: Option<Box<dyn RunClaim>>,
    run_id: String,
}

impl RunGuard {
    /// Records the final status and frees the collections.
    ///
    /// A failed status write is logged; the run's result stands.
    pub async fn finish(mut self, status: MigrationStatus) {
        if let Some(claim) = self.claim.take() {
            if let Err(e) = claim.release(status).await {
                warn!(run_id = %self.run_id, error = %e, "Failed to record run status");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::repositories::memory::MemoryRunLock;

    fn registry(lock: &MemoryRunLock) -> RunRegistry {
        RunRegistry {
            lock: Arc::new(lock.clone()),
        }
    }

    #[tokio::test]
    async fn test_registries_share_the_lock() {
        let lock = MemoryRunLock::new();
        let first = registry(&lock);
        let second = registry(&lock);

        let guard = first.begin("run-1", &[Collection::Products]).await.unwrap();
        let err = second
            .begin("run-2", &[Collection::Products])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::RunInProgress { .. }));

        guard.finish(MigrationStatus::Completed).await;
        assert!(second.begin("run-2", &[Collection::Products]).await.is_ok());
    }

    #[tokio::test]
    async fn test_finish_records_status() {
        let lock = MemoryRunLock::new();
        let runs = registry(&lock);

        let guard = runs.begin("run-1", &[Collection::Brands]).await.unwrap();
        guard.finish(MigrationStatus::Failed).await;

        let states = runs.states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, MigrationStatus::Failed);
    }
}
