//! End-to-end tests of the migration engine over the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use catalog_migrate::config::Config;
use catalog_migrate::context::Context;
use catalog_migrate::di::FromRef;
use catalog_migrate::error::AppError;
use catalog_migrate::models::{
    CategoryDocument, Collection, HistoryRecord, MigrationPhase, MigrationStatus,
    ProductDocument, SourceRecord, SourceTable,
};
use catalog_migrate::repositories::memory::{
    MemoryHistoryLog, MemoryPhaseStore, MemoryRunLock, MemorySource, MemoryTargetStore,
};
use catalog_migrate::repositories::{HistoryLog, PhaseStore, RunLock};
use catalog_migrate::services::MigrationOrchestrator;

struct Harness {
    source: Arc<MemorySource>,
    target: Arc<MemoryTargetStore>,
    phase_store: Arc<MemoryPhaseStore>,
    history: Arc<MemoryHistoryLog>,
    runs: MemoryRunLock,
    ctx: Context,
}

impl Harness {
    async fn new(source: MemorySource) -> Self {
        Self::with_phase_store(source, Arc::new(MemoryPhaseStore::new())).await
    }

    async fn with_phase_store(source: MemorySource, phase_store: Arc<MemoryPhaseStore>) -> Self {
        let source = Arc::new(source);
        let target = Arc::new(MemoryTargetStore::new());
        let history = Arc::new(MemoryHistoryLog::new());
        let runs = MemoryRunLock::new();
        let ctx = Self::context(&source, &target, &phase_store, &history, &runs).await;

        Self {
            source,
            target,
            phase_store,
            history,
            runs,
            ctx,
        }
    }

    /// A second process over the same stores and run lock.
    async fn second_process(&self) -> Context {
        Self::context(
            &self.source,
            &self.target,
            &self.phase_store,
            &self.history,
            &self.runs,
        )
        .await
    }

    async fn context(
        source: &Arc<MemorySource>,
        target: &Arc<MemoryTargetStore>,
        phase_store: &Arc<MemoryPhaseStore>,
        history: &Arc<MemoryHistoryLog>,
        runs: &MemoryRunLock,
    ) -> Context {
        let mut config = Config::new("memory://source", "memory://target");
        config.source.page_size = 2;
        config.migration.workers = Some(4);
        config.migration.operation_timeout_secs = 1;

        let ctx = Context::new(
            source.clone(),
            target.clone(),
            phase_store.clone(),
            history.clone(),
            Arc::new(runs.clone()),
            config,
        )
        .await
        .unwrap();
        ctx
    }

    fn orchestrator(&self) -> MigrationOrchestrator {
        MigrationOrchestrator::from_ref(&self.ctx)
    }

    fn product(&self, sku: &str) -> ProductDocument {
        self.target
            .documents(Collection::Products)
            .into_iter()
            .find(|d| d.key == sku)
            .unwrap()
            .decode()
            .unwrap()
    }

    fn categories(&self) -> Vec<CategoryDocument> {
        self.target
            .documents(Collection::Categories)
            .iter()
            .map(|d| d.decode::<CategoryDocument>().unwrap())
            .collect()
    }
}

fn keyed(id: i64, key: &str) -> SourceRecord {
    SourceRecord {
        natural_key: Some(key.to_string()),
        name: Some(format!("Record {}", id)),
        ..SourceRecord::new(id)
    }
}

fn product(id: i64, key: &str, brand: Option<i64>, category: Option<i64>) -> SourceRecord {
    SourceRecord {
        price: Some(100.0 + id as f64),
        stock: Some(id),
        owner_id: Some(1),
        brand_id: brand,
        category_id: category,
        ..keyed(id, key)
    }
}

fn category(id: i64, slug: &str, parent: Option<i64>) -> SourceRecord {
    SourceRecord {
        parent_id: parent,
        ..keyed(id, slug)
    }
}

fn catalog() -> MemorySource {
    MemorySource::new()
        .with(
            SourceTable::Brands,
            vec![keyed(1, "rayban"), keyed(2, "oakley"), keyed(3, "persol")],
        )
        .with(
            SourceTable::Categories,
            vec![
                category(10, "eyewear", None),
                category(11, "sunglasses", Some(10)),
                category(12, "aviators", Some(11)),
                category(13, "frames", Some(10)),
            ],
        )
        .with(
            SourceTable::Products,
            vec![
                product(100, "FR-100", Some(1), Some(12)),
                product(101, "FR-101", Some(2), Some(13)),
                product(102, "FR-102", None, None),
            ],
        )
        .with(SourceTable::Stores, vec![keyed(1, "main-street")])
}

#[tokio::test]
async fn test_zero_brands_completes() {
    let harness = Harness::new(MemorySource::new()).await;

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.records_migrated, 0);
    assert_eq!(result.records_failed, 0);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_full_migration_resolves_references() {
    let harness = Harness::new(catalog()).await;

    let run = harness.orchestrator().run_full_migration().await.unwrap();

    assert_eq!(run.overall.status, MigrationStatus::Completed);
    assert_eq!(run.results[&Collection::Brands].records_migrated, 3);
    assert_eq!(run.results[&Collection::Categories].records_migrated, 4);
    assert_eq!(run.results[&Collection::Products].records_migrated, 3);
    assert_eq!(run.overall.records_migrated, 10);
    assert!(run.overall.errors.is_empty(), "{:?}", run.overall.errors);

    let aviator = harness.product("FR-100");
    assert_eq!(aviator.brand_id, "rayban");
    assert_eq!(aviator.category_id, "aviators");
    assert_eq!(aviator.inventory_quantity, 100);
    assert_eq!(aviator.source, "migration");

    let unreferenced = harness.product("FR-102");
    assert_eq!(unreferenced.brand_id, "unbranded");
    assert_eq!(unreferenced.category_id, "uncategorized");
}

#[tokio::test]
async fn test_category_hierarchy_levels() {
    let harness = Harness::new(catalog()).await;
    harness.orchestrator().migrate_categories().await.unwrap();

    let categories = harness.categories();
    assert_eq!(categories.len(), 4);
    for doc in &categories {
        match &doc.parent_id {
            None => assert_eq!(doc.level, 0, "root {} must be level 0", doc.slug),
            Some(parent_slug) => {
                let parent = categories.iter().find(|c| &c.slug == parent_slug).unwrap();
                assert_eq!(doc.level, parent.level + 1, "{} under {}", doc.slug, parent.slug);
            }
        }
    }
    let aviators = categories.iter().find(|c| c.slug == "aviators").unwrap();
    assert_eq!(aviators.level, 2);
}

#[tokio::test]
async fn test_orphan_and_cyclic_categories_fail_per_record() {
    let source = MemorySource::new().with(
        SourceTable::Categories,
        vec![
            category(1, "root", None),
            category(2, "orphan", Some(99)),
            category(3, "loop-a", Some(4)),
            category(4, "loop-b", Some(3)),
        ],
    );
    let harness = Harness::new(source).await;

    let result = harness.orchestrator().migrate_categories().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.records_migrated, 1);
    assert_eq!(result.records_failed, 3);
    assert!(result
        .errors
        .iter()
        .all(|e| e.contains("[VALIDATION_ERROR]")));
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let harness = Harness::new(catalog()).await;
    let orchestrator = harness.orchestrator();
    orchestrator.run_full_migration().await.unwrap();

    let writes = harness.target.writes();
    let count = orchestrator.count(Collection::Products).await.unwrap();

    let rerun = orchestrator.migrate_products().await.unwrap();
    assert_eq!(rerun.status, MigrationStatus::Completed);
    assert_eq!(rerun.records_migrated, 0);
    assert_eq!(rerun.records_failed, 0);
    assert_eq!(rerun.summary["records_unchanged"], 3);
    assert_eq!(harness.target.writes(), writes);
    assert_eq!(orchestrator.count(Collection::Products).await.unwrap(), count);
}

#[tokio::test]
async fn test_changed_record_is_counted_on_rerun() {
    let harness = Harness::new(catalog()).await;
    let orchestrator = harness.orchestrator();
    orchestrator.run_full_migration().await.unwrap();

    let mut changed = product(101, "FR-101", Some(2), Some(13));
    changed.price = Some(42.0);
    harness.source.insert(SourceTable::Products, vec![changed]);

    let rerun = orchestrator.migrate_products().await.unwrap();
    assert_eq!(rerun.records_migrated, 1);
    assert_eq!(harness.product("FR-101").price, 42.0);
}

#[tokio::test]
async fn test_duplicate_natural_key_is_not_overwritten() {
    let source = MemorySource::new().with(
        SourceTable::Products,
        vec![
            product(1, "FR-1", None, None),
            product(2, "FR-1", None, None),
        ],
    );
    let harness = Harness::new(source).await;

    let result = harness.orchestrator().migrate_products().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.records_migrated, 1);
    assert_eq!(result.records_failed, 1);
    assert!(result.errors[0].contains("[DUPLICATE_KEY]"));
    assert_eq!(harness.target.documents(Collection::Products).len(), 1);
}

#[tokio::test]
async fn test_products_without_references_use_seeded_defaults() {
    let source = MemorySource::new().with(
        SourceTable::Products,
        vec![product(1, "FR-1", Some(7), Some(8))],
    );
    let harness = Harness::new(source).await;

    let result = harness.orchestrator().migrate_products().await.unwrap();
    assert_eq!(result.records_migrated, 1);
    assert_eq!(result.summary["default_references_seeded"], 2);
    assert_eq!(result.summary["records_with_issues"], 0);

    let doc = harness.product("FR-1");
    let brands = harness.target.documents(Collection::Brands);
    let categories = harness.target.documents(Collection::Categories);
    assert!(brands.iter().any(|b| b.key == doc.brand_id));
    assert!(categories.iter().any(|c| c.key == doc.category_id));
}

#[tokio::test]
async fn test_assess_reports_invalid_product() {
    let valid = product(1, "FR-1", None, None);
    let invalid = SourceRecord {
        price: None,
        stock: Some(-5),
        ..product(2, "FR-2", None, None)
    };
    let source = MemorySource::new()
        .with(SourceTable::Products, vec![valid, invalid])
        .with(SourceTable::Stores, vec![keyed(1, "main-street")]);
    let harness = Harness::new(source).await;

    let report = harness.orchestrator().assess_data_quality().await.unwrap();

    assert_eq!(report.total_records, 2);
    assert_eq!(report.valid_records, 1);
    assert_eq!(report.invalid_records, 1);
    assert!((report.completeness_score - 0.5).abs() < 1e-9);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].record_id, 2);

    let history = harness.history.recent(1).await.unwrap();
    assert!(matches!(history[0].record, HistoryRecord::Quality { .. }));
}

#[tokio::test]
async fn test_target_only_rejects_rollback_and_backfill() {
    let harness = Harness::new(catalog()).await;
    let orchestrator = harness.orchestrator();

    orchestrator
        .transition_phase(MigrationPhase::DualWriteTargetPrimary)
        .await
        .unwrap();
    orchestrator
        .transition_phase(MigrationPhase::TargetOnly)
        .await
        .unwrap();

    let err = orchestrator
        .transition_phase(MigrationPhase::DualWriteSourcePrimary)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidPhaseTransition { .. }));
    assert_eq!(orchestrator.get_phase().await, MigrationPhase::TargetOnly);

    let err = orchestrator.run_full_migration().await.unwrap_err();
    assert!(matches!(err, AppError::SourceDecommissioned(_)));
}

#[tokio::test]
async fn test_migration_does_not_change_phase() {
    let harness = Harness::new(catalog()).await;
    let orchestrator = harness.orchestrator();

    orchestrator.run_full_migration().await.unwrap();
    assert_eq!(
        orchestrator.get_phase().await,
        MigrationPhase::DualWriteSourcePrimary
    );
}

#[tokio::test]
async fn test_phase_survives_restart() {
    let phase_store = Arc::new(MemoryPhaseStore::new());
    let first = Harness::with_phase_store(MemorySource::new(), phase_store.clone()).await;
    first
        .orchestrator()
        .transition_phase(MigrationPhase::DualWriteTargetPrimary)
        .await
        .unwrap();

    let restarted = Harness::with_phase_store(MemorySource::new(), phase_store).await;
    assert_eq!(
        restarted.orchestrator().get_phase().await,
        MigrationPhase::DualWriteTargetPrimary
    );
    assert_eq!(restarted.ctx.phase.transitions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlapping_run_is_refused() {
    let harness = Harness::new(catalog()).await;
    let _running = harness
        .runs
        .claim("elsewhere", &[Collection::Products])
        .await
        .ok()
        .unwrap();

    let err = harness.orchestrator().migrate_products().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::RunInProgress {
            collection: Collection::Products
        }
    ));

    let err = harness.orchestrator().run_full_migration().await.unwrap_err();
    assert!(matches!(err, AppError::RunInProgress { .. }));
    assert!(harness.orchestrator().migrate_brands().await.is_ok());
}

#[tokio::test]
async fn test_concurrent_processes_exclude_each_other() {
    let harness = Harness::new(catalog()).await;
    harness.target.set_latency(Duration::from_millis(50));
    let other = harness.second_process().await;

    let first = harness.orchestrator();
    let second = MigrationOrchestrator::from_ref(&other);
    let (a, b) = tokio::join!(first.migrate_brands(), second.migrate_brands());

    let refused = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(AppError::RunInProgress { .. })))
        .count();
    assert_eq!(refused, 1);
    assert!(a.is_ok() || b.is_ok());

    let states = first.runs().await.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].collection, Collection::Brands);
    assert_eq!(states[0].status, MigrationStatus::Completed);
    assert!(states[0].finished_at.is_some());
}

#[tokio::test]
async fn test_unreachable_run_lock_fails_without_writing() {
    let harness = Harness::new(catalog()).await;
    harness.runs.set_unreachable(true);

    let result = harness.orchestrator().migrate_brands().await.unwrap();
    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(result.errors[0].contains("run not started"));
    assert_eq!(harness.target.writes(), 0);

    let full = harness.orchestrator().run_full_migration().await.unwrap();
    assert_eq!(full.overall.status, MigrationStatus::Failed);
    assert_eq!(harness.target.writes(), 0);
}

#[tokio::test]
async fn test_unreachable_source_fails_collection() {
    let harness = Harness::new(catalog()).await;
    harness.source.set_unreachable(true);

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.records_migrated, 0);
    assert!(result.errors[0].starts_with("[CONNECTIVITY_ERROR]"));
    // one attempt plus one retry
    assert_eq!(harness.source.reads(), 2);
}

#[tokio::test]
async fn test_failed_brands_reported_in_product_errors() {
    let harness = Harness::new(catalog()).await;
    // First brand page read and its retry
    harness.source.fail_next_reads(2);

    let run = harness.orchestrator().run_full_migration().await.unwrap();

    assert_eq!(run.results[&Collection::Brands].status, MigrationStatus::Failed);
    assert_eq!(run.overall.status, MigrationStatus::Failed);

    let products = &run.results[&Collection::Products];
    assert_eq!(products.records_migrated, 3);
    assert!(products.errors[0].starts_with("[DEPENDENCY_FAILED] brands"));
    assert_eq!(harness.product("FR-100").brand_id, "unbranded");
}

#[tokio::test]
async fn test_unreachable_target_fails_collection() {
    let harness = Harness::new(catalog()).await;
    harness.target.set_unreachable(true);

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.records_failed, 3);
    assert_eq!(result.records_migrated, 0);
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let harness = Harness::new(catalog()).await;
    harness.target.fail_key("oakley", 1);

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.records_migrated, 3);
    assert_eq!(result.records_failed, 0);
}

#[tokio::test]
async fn test_write_that_landed_before_timeout_is_counted() {
    let harness = Harness::new(catalog()).await;
    // stored on the first attempt, answered after the 1s timeout
    harness
        .target
        .stall_after_write("oakley", Duration::from_millis(1500));

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.records_migrated, 3);
    assert_eq!(result.records_failed, 0);
    assert_eq!(result.summary["records_unchanged"], 0);
    assert_eq!(result.summary["records_confirmed_on_retry"], 1);
    assert_eq!(harness.target.writes(), 3);
}

#[tokio::test]
async fn test_persistent_write_failure_is_recorded() {
    let harness = Harness::new(catalog()).await;
    harness.target.fail_key("oakley", 2);

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.records_migrated, 2);
    assert_eq!(result.records_failed, 1);
    assert!(result.errors[0].contains("record 2"));
}

#[tokio::test]
async fn test_slow_target_times_out() {
    let source = MemorySource::new().with(SourceTable::Brands, vec![keyed(1, "rayban")]);
    let harness = Harness::new(source).await;
    harness.target.set_latency(Duration::from_millis(1500));

    let result = harness.orchestrator().migrate_brands().await.unwrap();

    assert_eq!(result.records_failed, 1);
    assert!(result.errors[0].contains("[TIMEOUT]"));
}

#[tokio::test]
async fn test_history_records_every_collection() {
    let harness = Harness::new(catalog()).await;

    let run = harness.orchestrator().run_full_migration().await.unwrap();

    let entries = harness.history.recent(10).await.unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.run_id == run.run_id));
    assert!(matches!(entries[0].record, HistoryRecord::FullRun { .. }));
    assert_eq!(
        entries[1].record.collection(),
        Some(Collection::Products)
    );
}

#[tokio::test]
async fn test_history_outage_does_not_fail_run() {
    let harness = Harness::new(catalog()).await;
    harness.history.set_unreachable(true);

    let run = harness.orchestrator().run_full_migration().await.unwrap();

    assert_eq!(run.overall.status, MigrationStatus::Completed);
    assert!(harness.history.is_empty());
}

#[tokio::test]
async fn test_count_by_owner() {
    let harness = Harness::new(catalog()).await;
    let orchestrator = harness.orchestrator();
    orchestrator.run_full_migration().await.unwrap();

    assert_eq!(
        orchestrator
            .count_by_owner(Collection::Products, 1)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        orchestrator
            .count_by_owner(Collection::Products, 2)
            .await
            .unwrap(),
        0
    );
    assert!(harness.phase_store.transitions().await.unwrap().is_empty());
}
