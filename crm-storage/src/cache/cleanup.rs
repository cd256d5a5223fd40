//! Cache Cleanup Background Task
//!
//! Runs [`CacheCoordinator::cleanup_stale_cache`] on a fixed interval so a
//! long-lived session never accumulates expired or failed entries. The task
//! stops when its shutdown watch flips to `true` and hands back what it did.
//!
//! ```ignore
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = spawn_cleanup_task(coordinator.clone(), Duration::from_secs(300), shutdown_rx);
//!
//! // Later
//! let _ = shutdown_tx.send(true);
//! let totals = handle.await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::coordinator::CacheCoordinator;
use super::traits::QueryStore;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for cleanup activity.
#[derive(Debug, Default)]
pub struct CleanupMetrics {
    /// Sweeps completed since the task started
    pub cycles: AtomicU64,

    /// Entries evicted across all sweeps
    pub entries_removed: AtomicU64,
}

impl CleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CleanupSnapshot {
        CleanupSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cleanup metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSnapshot {
    pub cycles: u64,
    pub entries_removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep the cache every `period` until `shutdown_rx` reports `true`.
///
/// The first sweep happens one full period after start. A dropped sender is
/// treated as shutdown.
pub async fn cache_cleanup_task<S: QueryStore>(
    coordinator: Arc<CacheCoordinator<S>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> CleanupSnapshot {
    let metrics = CleanupMetrics::new();

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = period.as_secs(),
        max_entry_age_secs = coordinator.timing().max_entry_age.as_secs(),
        "Cache cleanup task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache cleanup task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let removed = coordinator.cleanup_stale_cache();
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                metrics
                    .entries_removed
                    .fetch_add(removed as u64, Ordering::Relaxed);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        entries_removed = snapshot.entries_removed,
        "Cache cleanup task completed"
    );
    snapshot
}

/// Spawn [`cache_cleanup_task`] on the current runtime.
pub fn spawn_cleanup_task<S: QueryStore + 'static>(
    coordinator: Arc<CacheCoordinator<S>>,
    period: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<CleanupSnapshot> {
    tokio::spawn(cache_cleanup_task(coordinator, period, shutdown_rx))
}
