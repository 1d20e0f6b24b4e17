//! Play-Count Reconciliation Background Task
//!
//! One task per process: it periodically drains the pending play-count diffs,
//! flushes them to the durable store as a batch of per-song increments, then
//! re-reads the full song set and merges it back into the read cache.
//!
//! Request handling never waits on this loop. A failed pass is logged,
//! counted, and abandoned; the loop proceeds to the next scheduled pass.
//! Flushed-but-failed deltas are NOT re-queued: the drained generation is
//! applied at most once, and a lost delta is only visible as a WARN log and a
//! `flush_errors` tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use encore_core::SongId;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::durable::DurableStore;
use crate::song_cache::SongCache;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default reconciliation interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Configuration for the reconciler task.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often to run a flush-then-refresh pass (default: 10 seconds)
    pub sync_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

impl ReconcilerConfig {
    /// Create a configuration with the given interval.
    pub fn new(sync_interval: Duration) -> Self {
        Self { sync_interval }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `ENCORE_SYNC_INTERVAL_SECS`: seconds between passes (default: 10)
    pub fn from_env() -> Self {
        let sync_interval = Duration::from_secs(
            std::env::var("ENCORE_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
        );
        Self { sync_interval }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Metrics for reconciliation passes.
#[derive(Debug, Default)]
pub struct ReconcilerMetrics {
    /// Total passes completed since startup (failed passes included)
    pub passes_completed: AtomicU64,

    /// Total per-song diffs flushed durably
    pub diffs_flushed: AtomicU64,

    /// Total per-song flush failures (those deltas are lost)
    pub flush_errors: AtomicU64,

    /// Total songs inserted or updated by cache refreshes
    pub songs_changed: AtomicU64,

    /// Total full-refresh failures
    pub refresh_errors: AtomicU64,
}

impl ReconcilerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ReconcilerSnapshot {
        ReconcilerSnapshot {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            diffs_flushed: self.diffs_flushed.load(Ordering::Relaxed),
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            songs_changed: self.songs_changed.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reconciler metrics at a point in time.
#[derive(Debug, Clone)]
pub struct ReconcilerSnapshot {
    pub passes_completed: u64,
    pub diffs_flushed: u64,
    pub flush_errors: u64,
    pub songs_changed: u64,
    pub refresh_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically reconciles the cache with the store.
///
/// Runs until the shutdown signal is received. Each tick performs one
/// [`run_pass`]; ticks never overlap (a slow pass swallows missed ticks), and
/// the first tick fires one full interval after startup. Shutdown is observed
/// at the top of the idle wait; an in-flight pass completes rather than being
/// aborted, so a drained diff generation is never abandoned mid-flush.
///
/// # Arguments
///
/// * `cache` - The facade shared with request handlers; also carries the
///   durable store handle
/// * `config` - Reconciliation interval
/// * `shutdown_rx` - Watch receiver for the shutdown signal
///
/// # Returns
///
/// Metrics collected during the task's lifetime
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
/// use std::sync::Arc;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(reconciler_task(
///     Arc::clone(&cache),
///     ReconcilerConfig::from_env(),
///     shutdown_rx,
/// ));
///
/// // Later, trigger shutdown and collect the final counters.
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await.unwrap();
/// ```
pub async fn reconciler_task<D: DurableStore>(
    cache: Arc<SongCache<D>>,
    config: ReconcilerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReconcilerMetrics> {
    let metrics = Arc::new(ReconcilerMetrics::new());

    let mut ticker = interval_at(
        Instant::now() + config.sync_interval,
        config.sync_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sync_interval_secs = config.sync_interval.as_secs(),
        "Reconciler started"
    );

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Reconciler shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                run_pass(cache.as_ref(), &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        passes_completed = snapshot.passes_completed,
        diffs_flushed = snapshot.diffs_flushed,
        flush_errors = snapshot.flush_errors,
        songs_changed = snapshot.songs_changed,
        refresh_errors = snapshot.refresh_errors,
        "Reconciler stopped"
    );

    metrics
}

/// Perform one flush-then-refresh pass.
///
/// Public so hosts and tests can drive a pass directly. Never returns an
/// error: every failure is logged, counted, and dropped until the next pass.
pub async fn run_pass<D: DurableStore>(cache: &SongCache<D>, metrics: &ReconcilerMetrics) {
    flush_diffs(cache, metrics).await;
    refresh_cache(cache, metrics).await;
    metrics.passes_completed.fetch_add(1, Ordering::Relaxed);
}

/// Flush the drained diff generation as one concurrent batch of increments.
///
/// Failures are per-song: one failed increment does not block the others.
async fn flush_diffs<D: DurableStore>(cache: &SongCache<D>, metrics: &ReconcilerMetrics) {
    let drained = cache.drain_pending();
    if drained.is_empty() {
        return;
    }

    // Collect before awaiting so no shard guard lives across the I/O.
    let pending: Vec<(SongId, i64)> = drained
        .iter()
        .map(|entry| (*entry.key(), *entry.value()))
        .collect();

    let durable = cache.durable();
    let results = join_all(pending.iter().map(|&(id, delta)| async move {
        durable
            .apply_increment(id, delta)
            .await
            .map_err(|err| (id, delta, err))
    }))
    .await;

    let mut flushed = 0u64;
    for result in results {
        match result {
            Ok(()) => flushed += 1,
            Err((id, delta, err)) => {
                // The delta left the accumulator when the generation was
                // drained; it is not re-queued. The next full refresh
                // re-reads whatever the store actually holds.
                tracing::warn!(
                    song_id = %id,
                    delta,
                    error = %err,
                    "Play count flush failed; delta dropped"
                );
                metrics.flush_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    if flushed > 0 {
        tracing::info!(songs = flushed, "Synced play count diffs");
        metrics.diffs_flushed.fetch_add(flushed, Ordering::Relaxed);
    }
}

/// Re-read the full song set and merge it into the read cache.
async fn refresh_cache<D: DurableStore>(cache: &SongCache<D>, metrics: &ReconcilerMetrics) {
    let songs = match cache.durable().read_all().await {
        Ok(songs) => songs,
        Err(err) => {
            tracing::error!(error = %err, "Full cache refresh failed");
            metrics.refresh_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let changed = cache.bulk_merge(songs);
    if changed > 0 {
        tracing::info!(songs = changed, "Refreshed read cache");
        metrics.songs_changed.fetch_add(changed as u64, Ordering::Relaxed);
    }
}

// ============================================================================
// TESTS
// ============================================================================
