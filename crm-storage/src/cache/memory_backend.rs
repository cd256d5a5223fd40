//! In-process query store backed by a `HashMap` behind an `RwLock`.
//!
//! At most one fetch per key is in flight. Later readers of the key wait on
//! a `watch` channel owned by the fetching reader and re-check the entry
//! once it is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::{CacheError, CrmResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;

use super::freshness::{CacheEntry, CacheRead, EntryStatus};
use super::keys::QueryKey;
use super::traits::{CacheStats, EntryPredicate, EntryUpdater, QueryFetcher, QueryStore};

type InFlightMap = HashMap<QueryKey, watch::Receiver<()>>;

#[derive(Debug, Default)]
pub struct InMemoryQueryStore {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    in_flight: Mutex<InFlightMap>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_errors: AtomicU64,
}

/// Marks one key as being fetched. Dropping it, on completion or when the
/// read is cancelled, wakes every reader waiting on the key.
struct InFlight<'a> {
    map: &'a Mutex<InFlightMap>,
    key: QueryKey,
    _done: watch::Sender<()>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

enum Claim<'a> {
    Hit(CacheRead<Value>),
    /// Another reader is fetching; `epoch` is the entry's epoch when we
    /// started waiting.
    Wait {
        done: watch::Receiver<()>,
        epoch: u64,
    },
    /// We fetch, starting at `epoch`.
    Fetch { guard: InFlight<'a>, epoch: u64 },
}

impl InMemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CrmResult<RwLockReadGuard<'_, HashMap<QueryKey, CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| CacheError::LockPoisoned.into())
    }

    fn write(&self) -> CrmResult<RwLockWriteGuard<'_, HashMap<QueryKey, CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned.into())
    }

    fn in_flight(&self) -> CrmResult<MutexGuard<'_, InFlightMap>> {
        self.in_flight
            .lock()
            .map_err(|_| CacheError::LockPoisoned.into())
    }

    /// Insert an entry verbatim. Lets callers seed entries with arbitrary
    /// timestamps and statuses.
    pub fn insert_entry(&self, key: QueryKey, entry: CacheEntry) -> CrmResult<()> {
        self.write()?.insert(key, entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
        }
    }

    /// Serve a fresh entry, join a running fetch, or claim the fetch.
    fn claim(&self, key: &QueryKey, stale_time: Duration) -> CrmResult<Claim<'_>> {
        let now = Utc::now();
        let mut entries = self.write()?;
        if let Some(entry) = entries.get(key) {
            if !entry.is_stale(now) {
                if let Some(value) = &entry.value {
                    return Ok(Claim::Hit(CacheRead::from_cache(
                        value.clone(),
                        entry.updated_at,
                    )));
                }
            }
        }

        let mut in_flight = self.in_flight()?;
        if let Some(done) = in_flight.get(key) {
            let epoch = entries.get(key).map_or(0, |e| e.epoch);
            return Ok(Claim::Wait {
                done: done.clone(),
                epoch,
            });
        }

        let (tx, rx) = watch::channel(());
        in_flight.insert(key.clone(), rx);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::pending(stale_time, now));
        entry.status = EntryStatus::Pending;
        entry.stale_time = stale_time;
        Ok(Claim::Fetch {
            guard: InFlight {
                map: &self.in_flight,
                key: key.clone(),
                _done: tx,
            },
            epoch: entry.epoch,
        })
    }

    /// Store the outcome of a fetch that started at `epoch`.
    fn settle(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        epoch: u64,
        result: CrmResult<Value>,
    ) -> CrmResult<CacheRead<Value>> {
        let now = Utc::now();
        let mut entries = self.write()?;
        let current = entries.get(key).map(|e| e.epoch);
        match result {
            Ok(value) => {
                let mut entry = CacheEntry::success(value.clone(), stale_time, now);
                if let Some(current) = current {
                    entry.epoch = current;
                    if current != epoch {
                        tracing::debug!(key = %key, "Fetch overtaken by invalidation; stored as stale");
                        entry.invalidated = true;
                    }
                }
                entries.insert(key.clone(), entry);
                Ok(CacheRead::from_fetch(value, now))
            }
            Err(e) => {
                self.fetch_errors.fetch_add(1, Ordering::Relaxed);
                let entry = entries
                    .entry(key.clone())
                    .or_insert_with(|| CacheEntry::pending(stale_time, now));
                entry.status = EntryStatus::Error;
                entry.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// After waiting on another reader: its error, if that fetch failed and
    /// nothing has touched the entry since.
    fn shared_failure(&self, key: &QueryKey, epoch: u64) -> CrmResult<Option<CacheError>> {
        let entries = self.read()?;
        Ok(entries.get(key).and_then(|entry| {
            (entry.status == EntryStatus::Error && entry.epoch == epoch).then(|| {
                CacheError::FetchFailed {
                    key: key.to_string(),
                    reason: entry.last_error.clone().unwrap_or_default(),
                }
            })
        }))
    }
}

#[async_trait]
impl QueryStore for InMemoryQueryStore {
    async fn fetch_query(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: &dyn QueryFetcher,
    ) -> CrmResult<CacheRead<Value>> {
        loop {
            match self.claim(key, stale_time)? {
                Claim::Hit(read) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(read);
                }
                Claim::Wait { mut done, epoch } => {
                    // Resolves with an error once the fetching reader drops its sender.
                    let _ = done.changed().await;
                    if let Some(failure) = self.shared_failure(key, epoch)? {
                        return Err(failure.into());
                    }
                }
                Claim::Fetch { guard, epoch } => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let result = fetcher.fetch(key).await;
                    let settled = self.settle(key, stale_time, epoch, result);
                    drop(guard);
                    return settled;
                }
            }
        }
    }

    async fn invalidate(&self, prefix: &QueryKey) -> CrmResult<usize> {
        let mut entries = self.write()?;
        let mut marked = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                entry.epoch += 1;
                marked += 1;
            }
        }
        Ok(marked)
    }

    fn set_query_data(
        &self,
        key: QueryKey,
        value: Value,
        stale_time: Duration,
        at: DateTime<Utc>,
    ) -> CrmResult<()> {
        let mut entries = self.write()?;
        let mut entry = CacheEntry::success(value, stale_time, at);
        entry.epoch = entries.get(&key).map_or(0, |e| e.epoch + 1);
        entries.insert(key, entry);
        Ok(())
    }

    fn update_matching(
        &self,
        prefix: &QueryKey,
        at: DateTime<Utc>,
        updater: &mut EntryUpdater<'_>,
    ) -> CrmResult<usize> {
        let mut entries = self.write()?;
        let mut changed = 0;
        for (key, entry) in entries.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(value) = entry.value.as_mut() {
                if updater(key, value) {
                    entry.updated_at = at;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn remove_where(&self, predicate: &EntryPredicate<'_>) -> CrmResult<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key, entry));
        Ok(before - entries.len())
    }

    fn get(&self, key: &QueryKey) -> CrmResult<Option<CacheEntry>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn snapshot(&self) -> CrmResult<Vec<(QueryKey, CacheEntry)>> {
        let mut all: Vec<_> = self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}
