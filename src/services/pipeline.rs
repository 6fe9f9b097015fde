//! Shared batch machinery for the collection migrators.
//!
//! Source pages are read one at a time; each page is transformed in order
//! and its upserts run on a bounded worker pool. Every store call gets the
//! configured timeout and one retry on connectivity-class failures.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::{AppSource, AppTarget, Context};
use crate::di::FromContext;
use crate::error::{AppError, StoreKind};
use crate::models::{
    Collection, MigrationResult, MigrationStatus, SourceRecord, SourceTable, StoredDocument,
};
use crate::repositories::UpsertOutcome;

/// Runs `op` under `timeout`, retrying once if it fails with a
/// connectivity-class error.
pub async fn with_retry<T, F, Fut>(
    store: StoreKind,
    operation: &str,
    timeout: Duration,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                store,
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis(),
            }),
        };

        match result {
            Err(e) if e.is_connectivity() && attempt < 2 => {
                warn!(%store, operation, error = %e, "Retrying after connectivity failure");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Per-run counters; owned by the run that created them.
#[derive(Debug)]
pub struct Tally {
    collection: Collection,
    started: Instant,
    seen: u64,
    migrated: u64,
    unchanged: u64,
    confirmed_on_retry: u64,
    failed: u64,
    attempted_writes: u64,
    connectivity_failures: u64,
    pages_read: u64,
    source_error: Option<AppError>,
    errors: Vec<String>,
    summary: BTreeMap<String, JsonValue>,
}

impl Tally {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            started: Instant::now(),
            seen: 0,
            migrated: 0,
            unchanged: 0,
            confirmed_on_retry: 0,
            failed: 0,
            attempted_writes: 0,
            connectivity_failures: 0,
            pages_read: 0,
            source_error: None,
            errors: Vec::new(),
            summary: BTreeMap::new(),
        }
    }

    pub fn page_read(&mut self, records: usize) {
        self.pages_read += 1;
        self.seen += records as u64;
    }

    /// Notes an error that is not tied to one record.
    pub fn note(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn summarize(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.summary.insert(key.to_string(), value.into());
    }

    /// Source read failed after retry; later pages are abandoned.
    pub fn source_failed(&mut self, err: AppError) {
        self.errors.push(format!(
            "{} (source read aborted after {} page(s))",
            err.describe(),
            self.pages_read
        ));
        self.source_error = Some(err);
    }

    /// Record rejected before reaching the target store.
    pub fn reject(&mut self, source_id: i64, err: AppError) {
        warn!(collection = %self.collection, source_id, error = %err, "Record rejected");
        self.failed += 1;
        self.errors
            .push(format!("record {}: {}", source_id, err.describe()));
    }

    /// Tallies one upsert. `retried` is true when the first attempt failed
    /// with a connectivity error or timed out.
    ///
    /// A failed attempt may still have committed. When the retry then finds
    /// the same body already stored, the write is counted as migrated rather
    /// than unchanged, and also reported under
    /// `records_confirmed_on_retry`.
    pub fn write_finished(
        &mut self,
        source_id: i64,
        outcome: &Result<UpsertOutcome, AppError>,
        retried: bool,
    ) {
        self.attempted_writes += 1;
        match outcome {
            Ok(UpsertOutcome::Unchanged) if retried => {
                debug!(collection = %self.collection, source_id, "Upsert confirmed on retry");
                self.migrated += 1;
                self.confirmed_on_retry += 1;
            }
            Ok(UpsertOutcome::Unchanged) => self.unchanged += 1,
            Ok(_) => self.migrated += 1,
            Err(e) => {
                if e.is_connectivity() {
                    self.connectivity_failures += 1;
                }
                warn!(collection = %self.collection, source_id, error = %e, "Upsert failed");
                self.failed += 1;
                self.errors
                    .push(format!("record {}: {}", source_id, e.describe()));
            }
        }
    }

    /// `FAILED` only when the source was never readable or the target
    /// rejected every attempted write as unreachable.
    fn status(&self) -> MigrationStatus {
        let source_down = self.source_error.is_some() && self.pages_read == 0;
        let target_down =
            self.attempted_writes > 0 && self.connectivity_failures == self.attempted_writes;
        if source_down || target_down {
            MigrationStatus::Failed
        } else {
            MigrationStatus::Completed
        }
    }

    pub fn finish(mut self) -> MigrationResult {
        let status = self.status();
        self.summary
            .insert("collection".to_string(), self.collection.as_str().into());
        self.summary
            .insert("total_source_records".to_string(), self.seen.into());
        self.summary
            .insert("records_unchanged".to_string(), self.unchanged.into());
        self.summary.insert(
            "records_confirmed_on_retry".to_string(),
            self.confirmed_on_retry.into(),
        );

        MigrationResult {
            status,
            records_migrated: self.migrated,
            records_failed: self.failed,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            errors: self.errors,
            summary: self.summary,
        }
    }
}

/// Source/target access with the run's timeout, page size and worker count.
#[derive(FromContext, Clone)]
pub struct Pipeline {
    source: AppSource,
    target: AppTarget,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn target(&self) -> &AppTarget {
        &self.target
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn timeout(&self) -> Duration {
        self.config.operation_timeout()
    }

    /// Keyset-paginated pages of `table`, each fetched with retry.
    ///
    /// Ends after the first short page or at the first read failure.
    pub fn pages(
        &self,
        table: SourceTable,
    ) -> impl Stream<Item = Result<Vec<SourceRecord>, AppError>> + Send + '_ {
        let page_size = self.config.source.page_size.max(1);

        async_stream::try_stream! {
            let mut after_id = None;
            loop {
                let page = with_retry(StoreKind::Source, "fetch_page", self.timeout(), || {
                    self.source.fetch_page(table, after_id, page_size)
                })
                .await?;

                let Some(last) = page.last() else { break };
                after_id = Some(last.id);
                let is_last = page.len() < page_size;
                debug!(%table, records = page.len(), ?after_id, "Fetched source page");
                yield page;

                if is_last {
                    break;
                }
            }
        }
    }

    /// Reads every page of `table`, stopping at the first failure.
    pub async fn read_all(&self, table: SourceTable, tally: &mut Tally) -> Vec<SourceRecord> {
        let mut records = Vec::new();
        let mut pages = std::pin::pin!(self.pages(table));
        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => {
                    tally.page_read(page.len());
                    records.extend(page);
                }
                Err(e) => {
                    tally.source_failed(e);
                    break;
                }
            }
        }
        records
    }

    pub async fn upsert(&self, doc: StoredDocument) -> Result<UpsertOutcome, AppError> {
        self.upsert_counting_attempts(doc).await.0
    }

    /// Like [`upsert`](Self::upsert), also reporting whether a retry was needed.
    async fn upsert_counting_attempts(
        &self,
        doc: StoredDocument,
    ) -> (Result<UpsertOutcome, AppError>, bool) {
        let mut attempts = 0u32;
        let outcome = with_retry(StoreKind::Target, "upsert", self.timeout(), || {
            attempts += 1;
            self.target.upsert(doc.clone())
        })
        .await;
        (outcome, attempts > 1)
    }

    /// Upserts a batch on the worker pool, tallying every outcome.
    ///
    /// Returns the source ids whose documents are now in the target store.
    pub async fn write_batch(
        &self,
        items: Vec<(i64, Result<StoredDocument, AppError>)>,
        tally: &mut Tally,
    ) -> Vec<i64> {
        let mut docs = Vec::with_capacity(items.len());
        for (source_id, item) in items {
            match item {
                Ok(doc) => docs.push((source_id, doc)),
                Err(e) => tally.reject(source_id, e),
            }
        }

        let outcomes: Vec<_> = stream::iter(docs)
            .map(|(source_id, doc)| async move {
                let (outcome, retried) = self.upsert_counting_attempts(doc).await;
                (source_id, outcome, retried)
            })
            .buffer_unordered(self.config.workers())
            .collect()
            .await;

        let mut stored = Vec::with_capacity(outcomes.len());
        for (source_id, outcome, retried) in outcomes {
            tally.write_finished(source_id, &outcome, retried);
            if outcome.is_ok() {
                stored.push(source_id);
            }
        }
        stored
    }

    /// Streams `table`, transforms each record and upserts the results.
    pub async fn migrate_paged<F>(&self, table: SourceTable, tally: &mut Tally, mut transform: F)
    where
        F: FnMut(&SourceRecord) -> Result<StoredDocument, AppError>,
    {
        let mut pages = std::pin::pin!(self.pages(table));
        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tally.source_failed(e);
                    break;
                }
            };
            tally.page_read(page.len());

            let items = page.iter().map(|r| (r.id, transform(r))).collect();
            self.write_batch(items, tally).await;
        }
    }
}
