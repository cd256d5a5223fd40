//! Staleness metadata for cached entries.
//!
//! Every entry records when its data was last written and the threshold
//! after which a read must refetch. Reads come back wrapped in
//! [`CacheRead`] so callers can see whether they were served from cache.

use chrono::{DateTime, Utc};
use crm_core::StaleTimes;
use serde_json::Value;
use std::time::Duration;

use super::keys::{EntityKind, QueryKey};

/// Stale threshold for a key, looked up by its entity segment.
///
/// Lead detail entries use their own threshold; every other lead key is a
/// list. Keys outside the domain are always stale.
pub fn stale_time_for(key: &QueryKey, stale_times: &StaleTimes) -> Duration {
    match key.entity() {
        Some(EntityKind::Pipelines) => stale_times.pipelines,
        Some(EntityKind::Columns) => stale_times.columns,
        Some(EntityKind::Leads) if key.is_lead_detail() => stale_times.lead_detail,
        Some(EntityKind::Leads) => stale_times.leads,
        Some(EntityKind::Contacts) => stale_times.contacts,
        Some(EntityKind::Tags) => stale_times.tags,
        Some(EntityKind::Comments) => stale_times.comments,
        Some(EntityKind::Analytics) => stale_times.analytics,
        None => Duration::ZERO,
    }
}

/// Outcome of the most recent fetch for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// A fetch is in flight.
    Pending,
    Success,
    /// The last fetch failed. Previously fetched data, if any, is kept.
    Error,
}

/// One cached query.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Option<Value>,
    pub status: EntryStatus,
    /// When `value` was last written. For an entry that never held data this
    /// is its creation time.
    pub updated_at: DateTime<Utc>,
    pub stale_time: Duration,
    /// Set by invalidation; cleared by the next successful write that
    /// started after it.
    pub invalidated: bool,
    pub last_error: Option<String>,
    /// Bumped by every invalidation and direct write. A fetch that finds a
    /// different epoch on completion was overtaken and lands as stale.
    pub epoch: u64,
}

impl CacheEntry {
    /// An entry holding freshly written data.
    pub fn success(value: Value, stale_time: Duration, at: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            status: EntryStatus::Success,
            updated_at: at,
            stale_time,
            invalidated: false,
            last_error: None,
            epoch: 0,
        }
    }

    /// A placeholder for a first fetch.
    pub fn pending(stale_time: Duration, at: DateTime<Utc>) -> Self {
        Self {
            value: None,
            status: EntryStatus::Pending,
            updated_at: at,
            stale_time,
            invalidated: false,
            last_error: None,
            epoch: 0,
        }
    }

    /// Age of the data at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// True when a read at `now` must refetch.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.invalidated
            || self.status != EntryStatus::Success
            || self.age(now) > self.stale_time
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    pub fn from_fetch(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Time since the value was written.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}
