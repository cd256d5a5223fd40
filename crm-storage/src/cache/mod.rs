//! Query cache for pipeline data.
//!
//! Entries are addressed by hierarchical [`QueryKey`]s and carry per-entity
//! staleness thresholds. The [`CacheCoordinator`] layers domain-aware
//! invalidation, prefetch, optimistic updates and cleanup over any
//! [`QueryStore`].

mod cleanup;
mod coordinator;
mod fetcher;
mod freshness;
pub mod keys;
mod memory_backend;
mod traits;

pub use cleanup::{cache_cleanup_task, spawn_cleanup_task, CleanupMetrics, CleanupSnapshot};
pub use coordinator::{CacheCoordinator, CacheMetrics, InvalidationReport, PrefetchReport};
pub use fetcher::StoreFetcher;
pub use freshness::{stale_time_for, CacheEntry, CacheRead, EntryStatus};
pub use keys::{EntityKind, KeyRoute, QueryKey, DOMAIN_ROOT};
pub use memory_backend::InMemoryQueryStore;
pub use traits::{CacheStats, EntryPredicate, EntryUpdater, QueryFetcher, QueryStore};
