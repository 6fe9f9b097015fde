//! Top-level coordinator: sequences collection migrations, gates them on
//! the current phase and records every result in the run history.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::migrators::{BrandMigrator, CategoryMigrator, ProductMigrator};
use super::phase::PhaseController;
use super::pipeline::{with_retry, Pipeline};
use super::quality::QualityAccumulator;
use super::runs::{RunGuard, RunRegistry};
use crate::config::Config;
use crate::context::{AppHistory, AppTarget, Context};
use crate::di::FromContext;
use crate::error::{AppError, StoreKind};
use crate::models::{
    generate_ulid, Collection, DataQualityReport, HistoryEntry, HistoryRecord, MigrationPhase,
    MigrationResult, MigrationStatus, PhaseTransition, RunState, SourceTable,
};

/// Outcome of [`MigrationOrchestrator::run_full_migration`].
#[derive(Debug, Clone, Serialize)]
pub struct FullMigration {
    /// Shared by every history entry written during the run.
    pub run_id: String,
    pub results: BTreeMap<Collection, MigrationResult>,
    pub overall: MigrationResult,
}

#[derive(FromContext, Clone)]
pub struct MigrationOrchestrator {
    pipeline: Pipeline,
    brands: BrandMigrator,
    categories: CategoryMigrator,
    products: ProductMigrator,
    target: AppTarget,
    history: AppHistory,
    phase: Arc<PhaseController>,
    runs: RunRegistry,
    config: Arc<Config>,
}

impl MigrationOrchestrator {
    pub async fn get_phase(&self) -> MigrationPhase {
        self.phase.get_phase().await
    }

    pub async fn transition_phase(&self, to: MigrationPhase) -> Result<PhaseTransition, AppError> {
        self.phase.transition_phase(to).await
    }

    /// Scores every source product. Products whose owner is not a known
    /// store get an advisory issue.
    pub async fn assess_data_quality(&self) -> Result<DataQualityReport, AppError> {
        let owners = self.known_owners().await;
        let mut quality = QualityAccumulator::with_known_owners(owners);

        let mut pages = std::pin::pin!(self.pipeline.pages(SourceTable::Products));
        while let Some(page) = pages.next().await {
            quality.observe_all(&page?);
        }

        let report = quality.finish();
        info!(
            total = report.total_records,
            valid = report.valid_records,
            completeness = report.completeness_score,
            consistency = report.consistency_score,
            "Data quality assessed"
        );

        self.record_history(&generate_ulid(), HistoryRecord::Quality {
            report: report.clone(),
        })
        .await;
        Ok(report)
    }

    /// Store ids from the source, or an empty set if they cannot be read.
    async fn known_owners(&self) -> HashSet<i64> {
        let mut owners = HashSet::new();
        let mut pages = std::pin::pin!(self.pipeline.pages(SourceTable::Stores));
        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => owners.extend(page.iter().map(|r| r.id)),
                Err(e) => {
                    warn!(error = %e, "Stores unreadable; skipping owner checks");
                    return HashSet::new();
                }
            }
        }
        owners
    }

    pub async fn migrate_brands(&self) -> Result<MigrationResult, AppError> {
        self.migrate(Collection::Brands).await
    }

    pub async fn migrate_categories(&self) -> Result<MigrationResult, AppError> {
        self.migrate(Collection::Categories).await
    }

    pub async fn migrate_products(&self) -> Result<MigrationResult, AppError> {
        self.migrate(Collection::Products).await
    }

    /// Migrates one collection.
    ///
    /// # Errors
    ///
    /// Only `RunInProgress` and `SourceDecommissioned`. Store failures,
    /// including an unreachable run lock, are reported inside the returned
    /// result.
    pub async fn migrate(&self, collection: Collection) -> Result<MigrationResult, AppError> {
        self.ensure_backfill_allowed().await?;
        let run_id = generate_ulid();
        let guard = match self.claim(&run_id, &[collection]).await {
            Ok(guard) => guard,
            Err(e) if e.is_connectivity() => return Ok(unclaimed(collection, &e)),
            Err(e) => return Err(e),
        };

        info!(%collection, %run_id, "Starting collection migration");
        let result = self.run_collection(collection, &[]).await;
        self.record_collection(&run_id, collection, &result).await;
        guard.finish(result.status).await;
        Ok(result)
    }

    /// Brands, then categories, then products.
    ///
    /// A failed prerequisite does not stop the run; it is reported in the
    /// product result's errors instead.
    pub async fn run_full_migration(&self) -> Result<FullMigration, AppError> {
        self.ensure_backfill_allowed().await?;
        let run_id = generate_ulid();
        let started = Instant::now();
        let (guard, claim_error) = match self.claim(&run_id, Collection::all()).await {
            Ok(guard) => (Some(guard), None),
            Err(e) if e.is_connectivity() => {
                error!(%run_id, error = %e, "Could not claim collections");
                (None, Some(e))
            }
            Err(e) => return Err(e),
        };
        info!(%run_id, claimed = guard.is_some(), "Starting full migration");

        let mut results = BTreeMap::new();
        for &collection in Collection::all() {
            if let Some(e) = &claim_error {
                results.insert(collection, unclaimed(collection, e));
                continue;
            }

            let failed: Vec<Collection> = collection
                .dependencies()
                .iter()
                .copied()
                .filter(|dep| {
                    results
                        .get(dep)
                        .is_some_and(|r: &MigrationResult| r.status == MigrationStatus::Failed)
                })
                .collect();

            let result = self.run_collection(collection, &failed).await;
            self.record_collection(&run_id, collection, &result).await;
            results.insert(collection, result);
        }

        let overall = MigrationResult::aggregate(&results, started.elapsed().as_secs_f64());
        info!(
            %run_id,
            status = %overall.status,
            migrated = overall.records_migrated,
            failed = overall.records_failed,
            "Full migration finished"
        );
        self.record_history(&run_id, HistoryRecord::FullRun {
            result: overall.clone(),
        })
        .await;
        if let Some(guard) = guard {
            guard.finish(overall.status).await;
        }

        Ok(FullMigration {
            run_id,
            results,
            overall,
        })
    }

    /// Latest run per collection, from any process.
    pub async fn runs(&self) -> Result<Vec<RunState>, AppError> {
        self.runs.states().await
    }

    pub async fn count_by_owner(
        &self,
        collection: Collection,
        owner_id: i64,
    ) -> Result<u64, AppError> {
        match collection {
            Collection::Brands => self.brands.count_by_owner(owner_id).await,
            Collection::Categories => self.categories.count_by_owner(owner_id).await,
            Collection::Products => self.products.count_by_owner(owner_id).await,
        }
    }

    /// Number of documents currently in `collection`.
    pub async fn count(&self, collection: Collection) -> Result<u64, AppError> {
        with_retry(
            StoreKind::Target,
            "count",
            self.config.operation_timeout(),
            || self.target.count(collection),
        )
        .await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        self.history.recent(limit).await
    }

    async fn claim(&self, run_id: &str, collections: &[Collection]) -> Result<RunGuard, AppError> {
        with_retry(
            StoreKind::Target,
            "claim",
            self.config.operation_timeout(),
            || self.runs.begin(run_id, collections),
        )
        .await
    }

    async fn ensure_backfill_allowed(&self) -> Result<(), AppError> {
        let phase = self.phase.get_phase().await;
        if phase.allows_backfill() {
            Ok(())
        } else {
            Err(AppError::SourceDecommissioned(phase))
        }
    }

    async fn run_collection(
        &self,
        collection: Collection,
        failed_dependencies: &[Collection],
    ) -> MigrationResult {
        let result = match collection {
            Collection::Brands => self.brands.migrate().await,
            Collection::Categories => self.categories.migrate().await,
            Collection::Products => self.products.migrate_after(failed_dependencies).await,
        };
        if result.status == MigrationStatus::Failed {
            error!(%collection, errors = ?result.errors.first(), "Collection migration failed");
        }
        result
    }

    async fn record_collection(&self, run_id: &str, collection: Collection, result: &MigrationResult) {
        self.record_history(run_id, HistoryRecord::Collection {
            collection,
            result: result.clone(),
        })
        .await;
    }

    /// History is audit-only; a failed write never fails the run.
    async fn record_history(&self, run_id: &str, record: HistoryRecord) {
        let entry = HistoryEntry::new(run_id, record);
        let written = with_retry(
            StoreKind::History,
            "append",
            self.config.operation_timeout(),
            || self.history.append(&entry),
        )
        .await;

        if let Err(e) = written {
            warn!(%run_id, kind = entry.record.kind(), error = %e, "Failed to record history");
        }
    }
}

/// Result for a collection that never started because its claim failed.
fn unclaimed(collection: Collection, err: &AppError) -> MigrationResult {
    MigrationResult {
        status: MigrationStatus::Failed,
        records_migrated: 0,
        records_failed: 0,
        duration_seconds: 0.0,
        errors: vec![format!("run not started: {}", err.describe())],
        summary: BTreeMap::from([("collection".to_string(), collection.as_str().into())]),
    }
}
