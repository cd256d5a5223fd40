//! Query-cache primitive traits.
//!
//! [`QueryStore`] is the generic keyed cache the coordinator drives;
//! [`QueryFetcher`] loads the data behind a key on a miss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::CrmResult;
use serde_json::Value;
use std::time::Duration;

use super::freshness::{CacheEntry, CacheRead};
use super::keys::QueryKey;

/// Loads the data a key stands for.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> CrmResult<Value>;
}

/// Mutation applied by [`QueryStore::update_matching`]. Returns true when it
/// changed the value.
pub type EntryUpdater<'a> = dyn FnMut(&QueryKey, &mut Value) -> bool + Send + 'a;

/// Eviction predicate for [`QueryStore::remove_where`].
pub type EntryPredicate<'a> = dyn Fn(&QueryKey, &CacheEntry) -> bool + Sync + 'a;

/// Keyed query cache.
///
/// Writes are last-writer-wins per key; there is no multi-key atomicity.
/// Implementations must not hold internal locks across an `.await`.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Serve `key` from cache when fresh, otherwise fetch and store it.
    ///
    /// Concurrent reads of one key share a single fetch. A value whose fetch
    /// was overtaken by an invalidation is returned to its caller but stored
    /// as invalidated, so the next read refetches.
    async fn fetch_query(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: &dyn QueryFetcher,
    ) -> CrmResult<CacheRead<Value>>;

    /// Mark every entry under `prefix` stale. Returns how many were marked.
    async fn invalidate(&self, prefix: &QueryKey) -> CrmResult<usize>;

    /// Write data for `key` directly, as if fetched at `at`.
    fn set_query_data(
        &self,
        key: QueryKey,
        value: Value,
        stale_time: Duration,
        at: DateTime<Utc>,
    ) -> CrmResult<()>;

    /// Run `updater` over the data of every entry under `prefix`. Entries the
    /// updater reports as changed get `updated_at = at`. Returns the number
    /// changed.
    fn update_matching(
        &self,
        prefix: &QueryKey,
        at: DateTime<Utc>,
        updater: &mut EntryUpdater<'_>,
    ) -> CrmResult<usize>;

    /// Drop every entry matching `predicate`. Returns the number removed.
    fn remove_where(&self, predicate: &EntryPredicate<'_>) -> CrmResult<usize>;

    fn get(&self, key: &QueryKey) -> CrmResult<Option<CacheEntry>>;

    /// Copy of every entry, in key order.
    fn snapshot(&self) -> CrmResult<Vec<(QueryKey, CacheEntry)>>;
}

/// Hit/miss counters of a query store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetch_errors: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
