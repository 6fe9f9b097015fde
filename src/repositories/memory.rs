//! In-memory repositories.
//!
//! Each fake implements the same trait as its PostgreSQL counterpart and
//! shares its semantics (keyset paging, upsert classification). Fault
//! injection hooks let tests simulate unreachable or slow stores.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use super::target::classify_upsert;
use super::{
    HistoryLog, PhaseStore, RunClaim, RunLock, SourceReader, TargetStore, UpsertOutcome,
};
use crate::error::{AppError, StoreKind};
use crate::models::{
    Collection, HistoryEntry, MigrationStatus, PhaseRecord, PhaseTransition, RunState,
    SourceRecord, SourceTable, StoredDocument,
};

fn poisoned(store: StoreKind) -> AppError {
    AppError::Internal(format!("{} store lock poisoned", store))
}

/// Source tables held in memory, always served in id order.
#[derive(Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<SourceTable, BTreeMap<i64, SourceRecord>>>,
    unreachable: AtomicBool,
    failing_reads: AtomicUsize,
    latency_ms: AtomicU64,
    reads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding for tests.
    pub fn with(self, table: SourceTable, records: Vec<SourceRecord>) -> Self {
        self.insert(table, records);
        self
    }

    /// Inserts or replaces records by id.
    pub fn insert(&self, table: SourceTable, records: Vec<SourceRecord>) {
        if let Ok(mut tables) = self.tables.write() {
            let rows = tables.entry(table).or_default();
            for record in records {
                rows.insert(record.id, record);
            }
        }
    }

    /// Every read fails with a connectivity error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// The next `count` page reads fail with a connectivity error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Delay applied to every read.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of page reads attempted, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn injected_failure(&self) -> Option<AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Some(AppError::connectivity(
                StoreKind::Source,
                "connection refused",
            ));
        }
        let consumed = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        consumed.then(|| AppError::connectivity(StoreKind::Source, "connection reset"))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch_page(
        &self,
        table: SourceTable,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, AppError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        simulate_latency(&self.latency_ms).await;
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let tables = self.tables.read().map_err(|_| poisoned(StoreKind::Source))?;
        let Some(rows) = tables.get(&table) else {
            return Ok(Vec::new());
        };

        let start = match after_id {
            None => i64::MIN,
            Some(id) => match id.checked_add(1) {
                Some(next) => next,
                None => return Ok(Vec::new()),
            },
        };
        Ok(rows
            .range(start..)
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::connectivity(StoreKind::Source, "connection refused"));
        }
        Ok(())
    }
}

/// Document collections held in memory.
#[derive(Default)]
pub struct MemoryTargetStore {
    docs: RwLock<BTreeMap<(Collection, String), StoredDocument>>,
    unreachable: AtomicBool,
    failing_keys: Mutex<HashMap<String, usize>>,
    stalled_keys: Mutex<HashMap<String, Duration>>,
    latency_ms: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// The next `count` upserts of `key` fail with a connectivity error.
    pub fn fail_key(&self, key: &str, count: usize) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.to_string(), count);
        }
    }

    /// The next upsert of `key` is stored, then takes `delay` to answer.
    pub fn stall_after_write(&self, key: &str, delay: Duration) {
        if let Ok(mut keys) = self.stalled_keys.lock() {
            keys.insert(key.to_string(), delay);
        }
    }

    /// Delay applied to every upsert.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of upserts that actually wrote (inserted or updated).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every document in a collection, in key order.
    pub fn documents(&self, collection: Collection) -> Vec<StoredDocument> {
        self.docs
            .read()
            .map(|docs| {
                docs.values()
                    .filter(|d| d.collection == collection)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::connectivity(StoreKind::Target, "connection refused"));
        }
        Ok(())
    }

    fn injected_key_failure(&self, key: &str) -> Result<(), AppError> {
        let mut keys = self
            .failing_keys
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?;
        match keys.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AppError::connectivity(
                    StoreKind::Target,
                    format!("write of '{}' reset by peer", key),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn upsert(&self, doc: StoredDocument) -> Result<UpsertOutcome, AppError> {
        simulate_latency(&self.latency_ms).await;
        self.check_reachable()?;
        self.injected_key_failure(&doc.key)?;

        let stall = self
            .stalled_keys
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?
            .remove(&doc.key);

        let outcome = {
            let mut docs = self.docs.write().map_err(|_| poisoned(StoreKind::Target))?;
            let id = (doc.collection, doc.key.clone());
            let outcome = classify_upsert(docs.get(&id), &doc)?;
            if outcome.wrote() {
                docs.insert(id, doc);
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            outcome
        };

        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        Ok(outcome)
    }

    async fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, AppError> {
        self.check_reachable()?;
        let docs = self.docs.read().map_err(|_| poisoned(StoreKind::Target))?;
        Ok(docs.get(&(collection, key.to_string())).cloned())
    }

    async fn reference_index(
        &self,
        collection: Collection,
    ) -> Result<HashMap<i64, String>, AppError> {
        self.check_reachable()?;
        let docs = self.docs.read().map_err(|_| poisoned(StoreKind::Target))?;
        Ok(docs
            .values()
            .filter(|d| d.collection == collection)
            .map(|d| (d.source_id, d.key.clone()))
            .collect())
    }

    async fn count(&self, collection: Collection) -> Result<u64, AppError> {
        self.check_reachable()?;
        let docs = self.docs.read().map_err(|_| poisoned(StoreKind::Target))?;
        Ok(docs.values().filter(|d| d.collection == collection).count() as u64)
    }

    async fn count_by_owner(
        &self,
        collection: Collection,
        owner_id: i64,
    ) -> Result<u64, AppError> {
        self.check_reachable()?;
        let docs = self.docs.read().map_err(|_| poisoned(StoreKind::Target))?;
        Ok(docs
            .values()
            .filter(|d| d.collection == collection && d.owner_id == Some(owner_id))
            .count() as u64)
    }
}

/// Phase record held in memory.
#[derive(Default)]
pub struct MemoryPhaseStore {
    record: RwLock<Option<PhaseRecord>>,
    transitions: RwLock<Vec<PhaseTransition>>,
    unreachable: AtomicBool,
}

impl MemoryPhaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an already-persisted record, as after a process restart.
    pub fn with_record(record: PhaseRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
            ..Self::default()
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::connectivity(StoreKind::Phase, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl PhaseStore for MemoryPhaseStore {
    async fn load(&self) -> Result<Option<PhaseRecord>, AppError> {
        self.check_reachable()?;
        let record = self.record.read().map_err(|_| poisoned(StoreKind::Phase))?;
        Ok(record.clone())
    }

    async fn save(
        &self,
        record: &PhaseRecord,
        transition: Option<&PhaseTransition>,
    ) -> Result<(), AppError> {
        self.check_reachable()?;
        let mut current = self.record.write().map_err(|_| poisoned(StoreKind::Phase))?;
        let mut trail = self
            .transitions
            .write()
            .map_err(|_| poisoned(StoreKind::Phase))?;
        *current = Some(record.clone());
        if let Some(t) = transition {
            trail.push(t.clone());
        }
        Ok(())
    }

    async fn transitions(&self) -> Result<Vec<PhaseTransition>, AppError> {
        self.check_reachable()?;
        let trail = self
            .transitions
            .read()
            .map_err(|_| poisoned(StoreKind::Phase))?;
        Ok(trail.clone())
    }
}

/// Run history held in memory.
#[derive(Default)]
pub struct MemoryHistoryLog {
    entries: RwLock<Vec<HistoryEntry>>,
    unreachable: AtomicBool,
}

impl MemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryLog for MemoryHistoryLog {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::connectivity(StoreKind::History, "connection refused"));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| poisoned(StoreKind::History))?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| poisoned(StoreKind::History))?;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

#[derive(Default)]
struct RunTable {
    held: Mutex<HashSet<Collection>>,
    states: Mutex<BTreeMap<Collection, RunState>>,
}

impl RunTable {
    fn free(&self, collections: &[Collection]) {
        if let Ok(mut held) = self.held.lock() {
            for collection in collections {
                held.remove(collection);
            }
        }
    }
}

/// Run claims held in memory.
///
/// Share one instance between contexts to model several processes working
/// against the same target database.
#[derive(Clone, Default)]
pub struct MemoryRunLock {
    table: Arc<RunTable>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryRunLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_held(&self, collection: Collection) -> bool {
        self.table
            .held
            .lock()
            .map(|held| held.contains(&collection))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RunLock for MemoryRunLock {
    async fn claim(
        &self,
        run_id: &str,
        collections: &[Collection],
    ) -> Result<Box<dyn RunClaim>, AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::connectivity(StoreKind::Target, "connection refused"));
        }

        let mut held = self
            .table
            .held
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?;
        if let Some(busy) = collections.iter().find(|c| held.contains(*c)) {
            return Err(AppError::RunInProgress { collection: *busy });
        }
        held.extend(collections.iter().copied());
        drop(held);

        let mut states = self
            .table
            .states
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?;
        for collection in collections {
            states.insert(*collection, RunState::started(*collection, run_id));
        }

        Ok(Box::new(MemoryRunClaim {
            table: Arc::clone(&self.table),
            run_id: run_id.to_string(),
            collections: collections.to_vec(),
        }))
    }

    async fn states(&self) -> Result<Vec<RunState>, AppError> {
        let states = self
            .table
            .states
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?;
        Ok(states.values().cloned().collect())
    }
}

struct MemoryRunClaim {
    table: Arc<RunTable>,
    run_id: String,
    collections: Vec<Collection>,
}

#[async_trait]
impl RunClaim for MemoryRunClaim {
    async fn release(self: Box<Self>, status: MigrationStatus) -> Result<(), AppError> {
        let mut states = self
            .table
            .states
            .lock()
            .map_err(|_| poisoned(StoreKind::Target))?;
        for collection in &self.collections {
            if let Some(state) = states.get_mut(collection) {
                if state.run_id == self.run_id {
                    state.status = status;
                    state.finished_at = Some(chrono::Utc::now());
                }
            }
        }
        Ok(())
    }
}

impl Drop for MemoryRunClaim {
    fn drop(&mut self) {
        self.table.free(&self.collections);
    }
}

async fn simulate_latency(latency_ms: &AtomicU64) {
    let ms = latency_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
