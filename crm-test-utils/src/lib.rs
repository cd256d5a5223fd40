//! CRM Test Utilities
//!
//! Shared test infrastructure for the CRM workspace:
//! - Proptest generators for identifiers, leads and snapshot fields
//! - Fixtures for a seeded two-pipeline board
//! - A lead store whose moves can be held open or scripted to fail
//! - A query store that fails invalidation for chosen keys
//! - Assertions over cache state

pub use crm_core::{
    ColumnId, CrmConfig, CrmError, CrmResult, DataStoreError, DataStoreErrorKind, EntityIdType,
    Lead, LeadId, LeadStatus, Pipeline, PipelineId, Timestamp,
};
pub use crm_storage::{
    CacheCoordinator, InMemoryLeadStore, InMemoryQueryStore, LeadStore, QueryKey, QueryStore,
    StoreFetcher,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::{CacheError, Column, Comment, Contact, PipelineStats, Tag};
use crm_storage::{
    cache::{CacheEntry, CacheRead, EntryPredicate, EntryUpdater, QueryFetcher},
    LeadFilter, StoreResult,
};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// CONTROLLED LEAD STORE
// ============================================================================

/// Lead store wrapper for concurrency and failure tests.
///
/// Reads go straight to the wrapped [`InMemoryLeadStore`]. Moves are counted,
/// can be held at a gate until the test releases them, and can be scripted
/// to fail with queued errors before reaching the inner store.
pub struct ControlledLeadStore {
    inner: Arc<InMemoryLeadStore>,
    gate: Option<Semaphore>,
    failures: Mutex<VecDeque<DataStoreError>>,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_started: Notify,
}

impl ControlledLeadStore {
    /// Moves pass straight through.
    pub fn new(inner: Arc<InMemoryLeadStore>) -> Self {
        Self::build(inner, None)
    }

    /// Every move waits until [`release`](Self::release) lets it through.
    pub fn gated(inner: Arc<InMemoryLeadStore>) -> Self {
        Self::build(inner, Some(Semaphore::new(0)))
    }

    fn build(inner: Arc<InMemoryLeadStore>, gate: Option<Semaphore>) -> Self {
        Self {
            inner,
            gate,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_started: Notify::new(),
        }
    }

    pub fn inner(&self) -> &InMemoryLeadStore {
        &self.inner
    }

    /// Queue an error for the next move.
    pub fn fail_next_move(&self, error: DataStoreError) {
        lock(&self.failures).push_back(error);
    }

    /// Let `n` held moves proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Resolves once a move call has started (including one that already has).
    pub async fn wait_for_call(&self) {
        self.call_started.notified().await;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of moves ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadStore for ControlledLeadStore {
    async fn move_lead_to_column(&self, lead_id: &LeadId, column_id: &ColumnId) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.call_started.notify_one();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let scripted = lock(&self.failures).pop_front();
        let result = match scripted {
            Some(error) => Err(error),
            None => self.inner.move_lead_to_column(lead_id, column_id).await,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_pipelines(&self) -> StoreResult<Vec<Pipeline>> {
        self.inner.list_pipelines().await
    }

    async fn get_pipeline(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        self.inner.get_pipeline(id).await
    }

    async fn list_columns(&self, pipeline_id: &PipelineId) -> StoreResult<Vec<Column>> {
        self.inner.list_columns(pipeline_id).await
    }

    async fn get_lead(&self, id: &LeadId) -> StoreResult<Option<Lead>> {
        self.inner.get_lead(id).await
    }

    async fn list_leads(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>> {
        self.inner.list_leads(filter).await
    }

    async fn list_lead_contacts(&self, lead_id: &LeadId) -> StoreResult<Vec<Contact>> {
        self.inner.list_lead_contacts(lead_id).await
    }

    async fn list_pending_contacts(&self) -> StoreResult<Vec<Contact>> {
        self.inner.list_pending_contacts().await
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        self.inner.list_tags().await
    }

    async fn list_lead_tags(&self, lead_id: &LeadId) -> StoreResult<Vec<Tag>> {
        self.inner.list_lead_tags(lead_id).await
    }

    async fn list_lead_comments(&self, lead_id: &LeadId) -> StoreResult<Vec<Comment>> {
        self.inner.list_lead_comments(lead_id).await
    }

    async fn pipeline_stats(&self, pipeline_id: &PipelineId) -> StoreResult<PipelineStats> {
        self.inner.pipeline_stats(pipeline_id).await
    }
}

// ============================================================================
// FAULT-INJECTING QUERY STORE
// ============================================================================

/// Query store that fails invalidation of chosen prefixes.
///
/// Every invalidation request is recorded, failed or not, so tests can check
/// which prefixes a batch targeted.
#[derive(Default)]
pub struct FailingQueryStore {
    inner: InMemoryQueryStore,
    failing: Mutex<HashSet<QueryKey>>,
    attempted: Mutex<Vec<QueryKey>>,
}

impl FailingQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryQueryStore {
        &self.inner
    }

    pub fn fail_invalidation_of(&self, key: QueryKey) {
        lock(&self.failing).insert(key);
    }

    /// Prefixes passed to `invalidate`, in call order.
    pub fn attempted(&self) -> Vec<QueryKey> {
        lock(&self.attempted).clone()
    }
}

#[async_trait]
impl QueryStore for FailingQueryStore {
    async fn fetch_query(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: &dyn QueryFetcher,
    ) -> CrmResult<CacheRead<Value>> {
        self.inner.fetch_query(key, stale_time, fetcher).await
    }

    async fn invalidate(&self, prefix: &QueryKey) -> CrmResult<usize> {
        lock(&self.attempted).push(prefix.clone());
        if lock(&self.failing).contains(prefix) {
            return Err(CacheError::InvalidationFailed {
                key: prefix.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.inner.invalidate(prefix).await
    }

    fn set_query_data(
        &self,
        key: QueryKey,
        value: Value,
        stale_time: Duration,
        at: DateTime<Utc>,
    ) -> CrmResult<()> {
        self.inner.set_query_data(key, value, stale_time, at)
    }

    fn update_matching(
        &self,
        prefix: &QueryKey,
        at: DateTime<Utc>,
        updater: &mut EntryUpdater<'_>,
    ) -> CrmResult<usize> {
        self.inner.update_matching(prefix, at, updater)
    }

    fn remove_where(&self, predicate: &EntryPredicate<'_>) -> CrmResult<usize> {
        self.inner.remove_where(predicate)
    }

    fn get(&self, key: &QueryKey) -> CrmResult<Option<CacheEntry>> {
        self.inner.get(key)
    }

    fn snapshot(&self) -> CrmResult<Vec<(QueryKey, CacheEntry)>> {
        self.inner.snapshot()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for CRM identifiers and records.

    use super::*;
    use proptest::prelude::*;

    /// A non-blank identifier such as `k3x9`.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,12}"
    }

    /// Empty or whitespace-only text.
    pub fn arb_blank() -> impl Strategy<Value = String> {
        prop_oneof![Just(""), Just(" "), Just("   "), Just("\t"), Just(" \n ")]
            .prop_map(String::from)
    }

    /// Either a real identifier or a blank one.
    pub fn arb_maybe_blank() -> impl Strategy<Value = String> {
        prop_oneof![arb_id(), arb_blank()]
    }

    pub fn arb_lead_id() -> impl Strategy<Value = LeadId> {
        arb_id().prop_map(LeadId::new)
    }

    pub fn arb_column_id() -> impl Strategy<Value = ColumnId> {
        arb_id().prop_map(ColumnId::new)
    }

    pub fn arb_pipeline_id() -> impl Strategy<Value = PipelineId> {
        arb_id().prop_map(PipelineId::new)
    }

    pub fn arb_lead_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,10}( [A-Z][a-z]{2,10})?"
    }

    pub fn arb_lead_status() -> impl Strategy<Value = LeadStatus> {
        prop_oneof![
            Just(LeadStatus::Open),
            Just(LeadStatus::Won),
            Just(LeadStatus::Lost),
        ]
    }

    /// Timestamps within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    /// An open lead in `column_id` of `pipeline_id`.
    pub fn arb_lead(pipeline_id: PipelineId, column_id: ColumnId) -> impl Strategy<Value = Lead> {
        (arb_lead_id(), arb_lead_name(), arb_timestamp()).prop_map(move |(id, name, at)| {
            Lead::new(id, name, pipeline_id.clone(), column_id.clone(), at)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! A seeded board: pipeline `P1` with columns `novo` and `qualificado`,
    //! pipeline `P2` with column `onboarding`, lead `L1` (Maria) and lead
    //! `L2` (João) in `novo`.

    use super::*;

    pub const PIPELINE: &str = "P1";
    pub const OTHER_PIPELINE: &str = "P2";
    pub const COLUMN_NOVO: &str = "novo";
    pub const COLUMN_QUALIFICADO: &str = "qualificado";
    pub const COLUMN_ONBOARDING: &str = "onboarding";
    pub const LEAD_MARIA: &str = "L1";
    pub const LEAD_JOAO: &str = "L2";

    pub fn pipeline(id: &str, position: i32) -> Pipeline {
        let now = Utc::now();
        Pipeline {
            id: PipelineId::new(id),
            name: format!("Pipeline {}", id),
            position,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn column(id: &str, pipeline_id: &str, position: i32) -> Column {
        let now = Utc::now();
        Column {
            id: ColumnId::new(id),
            name: id.to_string(),
            color: "#3b82f6".to_string(),
            pipeline_id: PipelineId::new(pipeline_id),
            position,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lead(id: &str, name: &str, pipeline_id: &str, column_id: &str) -> Lead {
        Lead::new(
            LeadId::new(id),
            name,
            PipelineId::new(pipeline_id),
            ColumnId::new(column_id),
            Utc::now(),
        )
    }

    pub fn seeded_store() -> Arc<InMemoryLeadStore> {
        let store = InMemoryLeadStore::new();
        let seed = || -> StoreResult<()> {
            store.insert_pipeline(pipeline(PIPELINE, 0))?;
            store.insert_pipeline(pipeline(OTHER_PIPELINE, 1))?;
            store.insert_column(column(COLUMN_NOVO, PIPELINE, 0))?;
            store.insert_column(column(COLUMN_QUALIFICADO, PIPELINE, 1))?;
            store.insert_column(column(COLUMN_ONBOARDING, OTHER_PIPELINE, 0))?;
            store.insert_lead(lead(LEAD_MARIA, "Maria", PIPELINE, COLUMN_NOVO))?;
            store.insert_lead(lead(LEAD_JOAO, "João", PIPELINE, COLUMN_NOVO))?;
            Ok(())
        };
        if let Err(e) = seed() {
            panic!("fixture seeding failed: {}", e);
        }
        Arc::new(store)
    }

    /// Cache coordinator over `store` with default timings.
    pub fn cache_over<S: QueryStore, L: LeadStore + 'static>(
        query_store: Arc<S>,
        store: Arc<L>,
    ) -> Arc<CacheCoordinator<S>> {
        Arc::new(CacheCoordinator::new(
            query_store,
            Arc::new(StoreFetcher::new(store)),
            CrmConfig::default().cache,
        ))
    }

    /// Seed a fresh entry for every key.
    pub fn warm(store: &impl QueryStore, keys: &[QueryKey]) {
        for key in keys {
            if let Err(e) = store.set_query_data(
                key.clone(),
                Value::Array(Vec::new()),
                Duration::from_secs(600),
                Utc::now(),
            ) {
                panic!("warming {} failed: {}", key, e);
            }
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache state.

    use super::*;

    fn entry(store: &impl QueryStore, key: &QueryKey) -> CacheEntry {
        match store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => panic!("no cache entry for {}", key),
            Err(e) => panic!("cache read for {} failed: {}", key, e),
        }
    }

    #[track_caller]
    pub fn assert_invalidated(store: &impl QueryStore, key: &QueryKey) {
        assert!(entry(store, key).invalidated, "expected {} to be invalidated", key);
    }

    #[track_caller]
    pub fn assert_not_invalidated(store: &impl QueryStore, key: &QueryKey) {
        assert!(!entry(store, key).invalidated, "expected {} to stay fresh", key);
    }

    /// Assert that a store error has the given kind.
    #[track_caller]
    pub fn assert_store_error_kind<T: std::fmt::Debug>(
        result: &StoreResult<T>,
        kind: DataStoreErrorKind,
    ) {
        match result {
            Err(e) => assert_eq!(e.kind, kind, "wrong kind for error: {}", e),
            Ok(value) => panic!("expected {} error, got Ok({:?})", kind, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;
    use super::*;
    use crm_storage::cache::keys;

    #[tokio::test]
    async fn test_scripted_failure_precedes_inner_store() {
        let store = ControlledLeadStore::new(seeded_store());
        store.fail_next_move(DataStoreError::opaque("connection reset"));

        let first = store
            .move_lead_to_column(&LeadId::new(LEAD_MARIA), &ColumnId::new(COLUMN_QUALIFICADO))
            .await;
        assert_eq!(first.unwrap_err().message, "connection reset");
        assert_eq!(store.inner().move_calls(), 0);

        let second = store
            .move_lead_to_column(&LeadId::new(LEAD_MARIA), &ColumnId::new(COLUMN_ONBOARDING))
            .await;
        assert_store_error_kind(&second, DataStoreErrorKind::PipelineMismatch);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_gated_move_waits_for_release() {
        let store = Arc::new(ControlledLeadStore::gated(seeded_store()));
        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .move_lead_to_column(&LeadId::new(LEAD_MARIA), &ColumnId::new(COLUMN_QUALIFICADO))
                    .await
            })
        };

        store.wait_for_call().await;
        assert_eq!(store.in_flight(), 1);
        store.release(1);
        task.await.unwrap().unwrap();
        assert_eq!(store.in_flight(), 0);
        assert_eq!(store.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failing_query_store_records_attempts() {
        let store = FailingQueryStore::new();
        warm(&store, &[keys::tags(), keys::pipelines()]);
        store.fail_invalidation_of(keys::tags());

        assert!(store.invalidate(&keys::tags()).await.is_err());
        assert_eq!(store.invalidate(&keys::pipelines()).await.unwrap(), 1);
        assert_eq!(store.attempted(), vec![keys::tags(), keys::pipelines()]);
        assert_not_invalidated(&store, &keys::tags());
        assert_invalidated(&store, &keys::pipelines());
    }
}
