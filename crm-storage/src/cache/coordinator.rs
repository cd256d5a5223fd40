//! Cache coordinator for the lead pipeline.
//!
//! Knows which cached queries a domain event makes stale and drives the
//! query store accordingly. It never initiates moves or writes to the data
//! store; callers ask it to invalidate, prefetch, optimistically patch, or
//! sweep after they have done so.
//!
//! Every batch is best-effort: each key is invalidated or prefetched
//! independently and concurrently, failures are collected into the returned
//! report and logged, and nothing is propagated to the caller.

use chrono::{DateTime, Utc};
use crm_core::{CacheTimingConfig, ColumnId, CrmError, CrmResult, LeadId, PipelineId};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::freshness::{stale_time_for, CacheRead, EntryStatus};
use super::keys::{self, QueryKey};
use super::traits::{QueryFetcher, QueryStore};

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of one invalidation batch.
#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    /// Prefixes the batch targeted.
    pub targeted: Vec<QueryKey>,
    /// Entries marked stale across all prefixes.
    pub entries_marked: usize,
    /// Prefixes whose invalidation failed, with the error.
    pub failures: Vec<(QueryKey, CrmError)>,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn targets(&self, key: &QueryKey) -> bool {
        self.targeted.contains(key)
    }
}

/// Outcome of one prefetch batch.
#[derive(Debug, Clone, Default)]
pub struct PrefetchReport {
    /// Keys served from cache without a fetch.
    pub already_fresh: Vec<QueryKey>,
    /// Keys fetched and stored.
    pub fetched: Vec<QueryKey>,
    pub failures: Vec<(QueryKey, CrmError)>,
}

/// Point-in-time counts over the whole cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub loading: usize,
    pub stale: usize,
    /// Entries whose key belongs to this domain.
    pub domain: usize,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Structured invalidation, prefetch, optimistic update and cleanup over a
/// [`QueryStore`].
///
/// Construct one per application (or per test) and share it by `Arc`.
pub struct CacheCoordinator<S: QueryStore> {
    store: Arc<S>,
    fetcher: Arc<dyn QueryFetcher>,
    timing: CacheTimingConfig,
}

impl<S: QueryStore> CacheCoordinator<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn QueryFetcher>, timing: CacheTimingConfig) -> Self {
        Self {
            store,
            fetcher,
            timing,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timing(&self) -> &CacheTimingConfig {
        &self.timing
    }

    /// Read through the cache using the key's configured stale threshold.
    pub async fn read(&self, key: &QueryKey) -> CrmResult<CacheRead<Value>> {
        let stale_time = stale_time_for(key, &self.timing.stale_times);
        self.store
            .fetch_query(key, stale_time, self.fetcher.as_ref())
            .await
    }

    // ------------------------------------------------------------------------
    // Key sets
    // ------------------------------------------------------------------------

    fn lead_keys(lead_id: &LeadId) -> Vec<QueryKey> {
        vec![
            keys::lead(lead_id),
            keys::lead_contacts(lead_id),
            keys::lead_tags(lead_id),
            keys::lead_comments(lead_id),
            keys::leads_list(),
            keys::pending_contacts(),
        ]
    }

    fn pipeline_keys(pipeline_id: &PipelineId) -> Vec<QueryKey> {
        vec![
            keys::pipeline(pipeline_id),
            keys::pipeline_columns(pipeline_id),
            keys::leads_by_pipeline(pipeline_id),
            keys::pipeline_stats(pipeline_id),
        ]
    }

    fn column_keys(column_id: &ColumnId) -> Vec<QueryKey> {
        vec![keys::leads_by_column(column_id), keys::leads_list()]
    }

    // ------------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------------

    async fn invalidate_batch(&self, operation: &str, mut targets: Vec<QueryKey>) -> InvalidationReport {
        targets.sort();
        targets.dedup();

        let results = join_all(targets.iter().map(|key| self.store.invalidate(key))).await;

        let mut report = InvalidationReport {
            targeted: targets.clone(),
            ..Default::default()
        };
        for (key, result) in targets.into_iter().zip(results) {
            match result {
                Ok(marked) => report.entries_marked += marked,
                Err(e) => {
                    tracing::warn!(operation, key = %key, error = %e, "Cache invalidation failed");
                    report.failures.push((key, e));
                }
            }
        }

        tracing::debug!(
            operation,
            targeted = report.targeted.len(),
            marked = report.entries_marked,
            failed = report.failures.len(),
            "Cache invalidation batch settled"
        );
        report
    }

    /// Lead detail, its contacts, tags and comments, every general leads
    /// list, and the pending-contacts list.
    pub async fn invalidate_lead_data(&self, lead_id: &LeadId) -> InvalidationReport {
        self.invalidate_batch("invalidate_lead_data", Self::lead_keys(lead_id))
            .await
    }

    /// Pipeline detail, its columns, its lead lists and its statistics.
    pub async fn invalidate_pipeline_data(&self, pipeline_id: &PipelineId) -> InvalidationReport {
        self.invalidate_batch("invalidate_pipeline_data", Self::pipeline_keys(pipeline_id))
            .await
    }

    /// Leads of the column and every general leads list.
    pub async fn invalidate_column_data(&self, column_id: &ColumnId) -> InvalidationReport {
        self.invalidate_batch("invalidate_column_data", Self::column_keys(column_id))
            .await
    }

    /// Everything a committed lead move makes stale: the lead, both columns,
    /// the pipeline and every analytics entry. Runs as a single batch.
    pub async fn invalidate_lead_movement(
        &self,
        lead_id: &LeadId,
        from_column: &ColumnId,
        to_column: &ColumnId,
        pipeline_id: &PipelineId,
    ) -> InvalidationReport {
        let mut targets = Self::lead_keys(lead_id);
        targets.extend(Self::column_keys(from_column));
        targets.extend(Self::column_keys(to_column));
        targets.extend(Self::pipeline_keys(pipeline_id));
        targets.push(keys::analytics());

        let report = self.invalidate_batch("invalidate_lead_movement", targets).await;
        tracing::info!(
            lead_id = %lead_id,
            from = %from_column,
            to = %to_column,
            pipeline_id = %pipeline_id,
            marked = report.entries_marked,
            "Invalidated cache after lead move"
        );
        report
    }

    /// Contacts of a lead and the pending-contacts list.
    pub async fn invalidate_contact_data(&self, lead_id: &LeadId) -> InvalidationReport {
        self.invalidate_batch(
            "invalidate_contact_data",
            vec![keys::lead_contacts(lead_id), keys::pending_contacts()],
        )
        .await
    }

    /// Every tag entry, global and per lead.
    pub async fn invalidate_tag_data(&self) -> InvalidationReport {
        self.invalidate_batch("invalidate_tag_data", vec![keys::tags()])
            .await
    }

    /// Every entry of the domain.
    pub async fn invalidate_all(&self) -> InvalidationReport {
        self.invalidate_batch("invalidate_all", vec![keys::all()]).await
    }

    // ------------------------------------------------------------------------
    // Prefetch
    // ------------------------------------------------------------------------

    async fn prefetch_batch(&self, operation: &str, targets: Vec<QueryKey>) -> PrefetchReport {
        let results = join_all(targets.iter().map(|key| self.read(key))).await;

        let mut report = PrefetchReport::default();
        for (key, result) in targets.into_iter().zip(results) {
            match result {
                Ok(read) if read.was_cache_hit() => report.already_fresh.push(key),
                Ok(_) => report.fetched.push(key),
                Err(e) => {
                    tracing::warn!(operation, key = %key, error = %e, "Cache prefetch failed");
                    report.failures.push((key, e));
                }
            }
        }
        tracing::debug!(
            operation,
            fetched = report.fetched.len(),
            fresh = report.already_fresh.len(),
            failed = report.failures.len(),
            "Cache prefetch batch settled"
        );
        report
    }

    /// Warm contacts, comments and tags of a lead ahead of a detail view.
    pub async fn prefetch_lead_data(&self, lead_id: &LeadId) -> PrefetchReport {
        self.prefetch_batch(
            "prefetch_lead_data",
            vec![
                keys::lead_contacts(lead_id),
                keys::lead_comments(lead_id),
                keys::lead_tags(lead_id),
            ],
        )
        .await
    }

    /// Warm the columns and leads of a pipeline ahead of a board view.
    pub async fn prefetch_pipeline_data(&self, pipeline_id: &PipelineId) -> PrefetchReport {
        self.prefetch_batch(
            "prefetch_pipeline_data",
            vec![
                keys::pipeline_columns(pipeline_id),
                keys::leads_by_pipeline(pipeline_id),
            ],
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Optimistic update
    // ------------------------------------------------------------------------

    /// Merge `partial` into every cached copy of the lead: list entries
    /// containing it and its detail entry. Presentation only; a later
    /// invalidation and refetch is expected to overwrite it.
    ///
    /// Returns the number of cache entries changed. Non-object `partial`
    /// values change nothing.
    pub fn set_optimistic_lead_update(&self, lead_id: &LeadId, partial: &Value) -> usize {
        let Some(patch) = partial.as_object() else {
            tracing::warn!(lead_id = %lead_id, "Optimistic update ignored: patch is not an object");
            return 0;
        };
        let target = lead_id.to_string();
        let detail_key = keys::lead(lead_id);

        let result = self.store.update_matching(&keys::leads(), Utc::now(), &mut |key, value| {
            if key == &detail_key {
                return value.as_object_mut().map_or(false, |lead| merge(lead, patch));
            }
            if key.is_lead_detail() {
                return false;
            }
            let Some(list) = value.as_array_mut() else {
                return false;
            };
            let mut changed = false;
            for item in list.iter_mut() {
                if let Some(lead) = item.as_object_mut() {
                    if lead.get("id").and_then(Value::as_str) == Some(target.as_str()) {
                        changed |= merge(lead, patch);
                    }
                }
            }
            changed
        });

        match result {
            Ok(changed) => {
                tracing::debug!(lead_id = %lead_id, entries = changed, "Applied optimistic lead update");
                changed
            }
            Err(e) => {
                tracing::warn!(lead_id = %lead_id, error = %e, "Optimistic lead update failed");
                0
            }
        }
    }

    // ------------------------------------------------------------------------
    // Cleanup / metrics
    // ------------------------------------------------------------------------

    /// Evict entries older than the max entry age or stuck in error.
    pub fn cleanup_stale_cache(&self) -> usize {
        self.cleanup_stale_cache_at(Utc::now())
    }

    /// [`cleanup_stale_cache`](Self::cleanup_stale_cache) as of `now`.
    pub fn cleanup_stale_cache_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = self.timing.max_entry_age;
        let removed = self.store.remove_where(&|_, entry| {
            entry.status == EntryStatus::Error || entry.age(now) > max_age
        });
        match removed {
            Ok(count) => {
                tracing::info!(removed = count, "Cache cleanup sweep completed");
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache cleanup sweep failed");
                0
            }
        }
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache_metrics_at(Utc::now())
    }

    /// [`cache_metrics`](Self::cache_metrics) as of `now`.
    pub fn cache_metrics_at(&self, now: DateTime<Utc>) -> CacheMetrics {
        let entries = match self.store.snapshot() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Cache metrics unavailable");
                return CacheMetrics::default();
            }
        };

        let mut metrics = CacheMetrics {
            total: entries.len(),
            ..Default::default()
        };
        for (key, entry) in &entries {
            match entry.status {
                EntryStatus::Success => metrics.success += 1,
                EntryStatus::Error => metrics.error += 1,
                EntryStatus::Pending => metrics.loading += 1,
            }
            if entry.invalidated || entry.age(now) > entry.stale_time {
                metrics.stale += 1;
            }
            if key.is_in_domain() {
                metrics.domain += 1;
            }
        }
        metrics
    }
}

/// Shallow-merge `patch` into `target`. Returns true if anything changed.
fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (field, value) in patch {
        if target.get(field) != Some(value) {
            target.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
