//! Brand, category and product migrators.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use super::pipeline::{with_retry, Pipeline, Tally};
use super::quality::QualityAccumulator;
use super::transform::{
    parent_source_id, transform_brand, transform_category, transform_product, ReferenceIndex,
};
use crate::context::Context;
use crate::di::FromContext;
use crate::error::{AppError, StoreKind, TransformError};
use crate::models::{
    BrandDocument, CategoryDocument, Collection, MigrationResult, SourceRecord, SourceTable,
    TargetDocument,
};

/// Documents migrated for `owner_id` in `collection`.
async fn count_owned(
    pipeline: &Pipeline,
    collection: Collection,
    owner_id: i64,
) -> Result<u64, AppError> {
    with_retry(
        StoreKind::Target,
        "count_by_owner",
        pipeline.config().operation_timeout(),
        || pipeline.target().count_by_owner(collection, owner_id),
    )
    .await
}

#[derive(FromContext, Clone)]
pub struct BrandMigrator {
    pipeline: Pipeline,
}

impl BrandMigrator {
    pub async fn migrate(&self) -> MigrationResult {
        let mut tally = Tally::new(Collection::Brands);
        self.pipeline
            .migrate_paged(SourceTable::Brands, &mut tally, |record| {
                transform_brand(record)?.to_stored()
            })
            .await;

        let result = tally.finish();
        info!(
            status = %result.status,
            migrated = result.records_migrated,
            failed = result.records_failed,
            "Brand migration finished"
        );
        result
    }

    /// Brands carry no owner, so this is zero unless a store owns some.
    pub async fn count_by_owner(&self, owner_id: i64) -> Result<u64, AppError> {
        count_owned(&self.pipeline, Collection::Brands, owner_id).await
    }
}

/// Migrates categories root-first so every child can take its parent's level.
#[derive(FromContext, Clone)]
pub struct CategoryMigrator {
    pipeline: Pipeline,
}

impl CategoryMigrator {
    pub async fn migrate(&self) -> MigrationResult {
        let mut tally = Tally::new(Collection::Categories);
        let records = self
            .pipeline
            .read_all(SourceTable::Categories, &mut tally)
            .await;

        let mut pending: BTreeMap<i64, SourceRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        let mut placed: HashMap<i64, CategoryDocument> = HashMap::new();
        let mut waves = 0u32;

        loop {
            // A record is ready once it is a root or its parent has been placed
            let ready: Vec<i64> = pending
                .values()
                .filter(|r| parent_source_id(r).map_or(true, |p| placed.contains_key(&p)))
                .map(|r| r.id)
                .collect();
            if ready.is_empty() {
                break;
            }
            waves += 1;

            let mut docs = HashMap::new();
            let mut items = Vec::with_capacity(ready.len());
            for id in ready {
                let Some(record) = pending.remove(&id) else {
                    continue;
                };
                let parent = parent_source_id(&record).and_then(|p| placed.get(&p));
                let item = transform_category(&record, parent)
                    .map_err(AppError::from)
                    .and_then(|doc| {
                        let stored = doc.to_stored()?;
                        docs.insert(id, doc);
                        Ok(stored)
                    });
                items.push((id, item));
            }

            for id in self.pipeline.write_batch(items, &mut tally).await {
                if let Some(doc) = docs.remove(&id) {
                    placed.insert(id, doc);
                }
            }
        }

        // Whatever is left has a parent that is missing, failed or cyclic
        for record in pending.values() {
            let parent_id = parent_source_id(record).unwrap_or_default();
            tally.reject(
                record.id,
                TransformError::UnresolvedParent {
                    source_id: record.id,
                    parent_id,
                }
                .into(),
            );
        }

        let max_level = placed.values().map(|d| d.level).max();
        tally.summarize("hierarchy_waves", waves);
        tally.summarize("max_level", max_level);

        let result = tally.finish();
        info!(
            status = %result.status,
            migrated = result.records_migrated,
            failed = result.records_failed,
            waves,
            "Category migration finished"
        );
        result
    }

    pub async fn count_by_owner(&self, owner_id: i64) -> Result<u64, AppError> {
        count_owned(&self.pipeline, Collection::Categories, owner_id).await
    }
}

/// Migrates products, resolving brand and category references through the
/// documents already in the target store.
#[derive(FromContext, Clone)]
pub struct ProductMigrator {
    pipeline: Pipeline,
}

impl ProductMigrator {
    pub async fn migrate(&self) -> MigrationResult {
        self.migrate_after(&[]).await
    }

    /// Runs the migration, reporting each failed prerequisite collection as
    /// an error up front. The run still proceeds on default references.
    pub async fn migrate_after(&self, failed_dependencies: &[Collection]) -> MigrationResult {
        let config = self.pipeline.config();
        let default_brand = config.migration.default_brand.clone();
        let default_category = config.migration.default_category.clone();

        let mut tally = Tally::new(Collection::Products);
        for dependency in failed_dependencies {
            tally.note(format!(
                "[DEPENDENCY_FAILED] {} migration failed; product references fall back to \
                 '{}'/'{}'",
                dependency, default_brand, default_category
            ));
        }

        let seeded = self
            .seed_defaults(&default_brand, &default_category, &mut tally)
            .await;
        tally.summarize("default_references_seeded", seeded);

        let brands = self.reference_index(Collection::Brands, &mut tally).await;
        let categories = self
            .reference_index(Collection::Categories, &mut tally)
            .await;

        let mut quality = QualityAccumulator::counting();
        self.pipeline
            .migrate_paged(SourceTable::Products, &mut tally, |record| {
                quality.observe(record);
                transform_product(record, &brands, &categories, &default_brand, &default_category)?
                    .to_stored()
            })
            .await;

        let flagged = quality.flagged();
        let report = quality.finish();
        tally.summarize("completeness_score", report.completeness_score);
        tally.summarize("consistency_score", report.consistency_score);
        tally.summarize("records_with_issues", flagged);

        let result = tally.finish();
        info!(
            status = %result.status,
            migrated = result.records_migrated,
            failed = result.records_failed,
            "Product migration finished"
        );
        result
    }

    pub async fn count_by_owner(&self, owner_id: i64) -> Result<u64, AppError> {
        count_owned(&self.pipeline, Collection::Products, owner_id).await
    }

    /// Ensures the fallback brand and category exist. Returns how many were
    /// written by this call.
    ///
    /// A real source record already holding a default key satisfies the
    /// reference just as well, so that collision is not an error.
    async fn seed_defaults(&self, brand: &str, category: &str, tally: &mut Tally) -> u64 {
        let seeds = [
            BrandDocument::fallback(brand).to_stored(),
            CategoryDocument::fallback(category).to_stored(),
        ];

        let mut written = 0;
        for seed in seeds {
            let outcome = match seed {
                Ok(doc) => self.pipeline.upsert(doc).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(outcome) if outcome.wrote() => written += 1,
                Ok(_) | Err(AppError::DuplicateKey { .. }) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to seed default reference");
                    tally.note(format!("default reference: {}", e.describe()));
                }
            }
        }
        written
    }

    async fn reference_index(&self, collection: Collection, tally: &mut Tally) -> ReferenceIndex {
        let target = self.pipeline.target();
        let index = with_retry(
            StoreKind::Target,
            "reference_index",
            self.pipeline.config().operation_timeout(),
            || target.reference_index(collection),
        )
        .await;

        match index {
            Ok(index) => index,
            Err(e) => {
                warn!(%collection, error = %e, "Reference index unavailable; using defaults");
                tally.note(format!("{} reference index: {}", collection, e.describe()));
                HashMap::new()
            }
        }
    }
}
