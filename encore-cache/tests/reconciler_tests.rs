//! End-to-end reconciliation tests against the in-memory durable store.

use std::sync::Arc;
use std::time::Duration;

use encore_cache::{
    reconciler_task, run_pass, InMemoryDurableStore, ReconcilerConfig, ReconcilerMetrics,
    SongCache,
};
use encore_core::Song;
use tokio::sync::watch;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

fn new_cache() -> (
    Arc<InMemoryDurableStore>,
    Arc<SongCache<InMemoryDurableStore>>,
) {
    let store = Arc::new(InMemoryDurableStore::new());
    let cache = Arc::new(SongCache::new(Arc::clone(&store)));
    (store, cache)
}

#[tokio::test]
async fn pass_flushes_diffs_and_refreshes_base() {
    init_tracing();
    let (store, cache) = new_cache();

    let song = Song::new("X", "Y");
    let id = song.song_id;
    store.insert(song.clone());
    cache.insert(song);
    assert_eq!(cache.list_with_counts()[0].play_count, 0);

    for _ in 0..3 {
        cache.increment(id).await.unwrap().unwrap();
    }
    assert_eq!(cache.list_with_counts()[0].play_count, 3);

    let metrics = ReconcilerMetrics::new();
    run_pass(cache.as_ref(), &metrics).await;

    // Flushed durably, base refreshed, diff consumed; the observable count
    // is unchanged through the whole cycle.
    assert_eq!(store.play_count(&id), Some(3));
    assert_eq!(cache.cached(&id).unwrap().play_count, 3);
    assert_eq!(cache.pending_diff(&id), 0);
    assert_eq!(cache.list_with_counts()[0].play_count, 3);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_completed, 1);
    assert_eq!(snapshot.diffs_flushed, 1);
    assert_eq!(snapshot.songs_changed, 1);
    assert_eq!(snapshot.flush_errors, 0);
}

#[tokio::test]
async fn pass_with_no_diffs_still_refreshes() {
    init_tracing();
    let (store, cache) = new_cache();
    store.insert(Song::new("Breathe", "Telepopmusik"));

    let metrics = ReconcilerMetrics::new();
    run_pass(cache.as_ref(), &metrics).await;

    assert_eq!(cache.song_ids().len(), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.diffs_flushed, 0);
    assert_eq!(snapshot.songs_changed, 1);
}

#[tokio::test]
async fn failed_flush_drops_deltas_and_loop_continues() {
    init_tracing();
    let (store, cache) = new_cache();

    let song = Song::new("Roads", "Portishead");
    let id = song.song_id;
    store.insert(song.clone());
    cache.insert(song);

    cache.increment(id).await.unwrap().unwrap();
    cache.increment(id).await.unwrap().unwrap();

    store.set_fail_increments(true);
    let metrics = ReconcilerMetrics::new();
    run_pass(cache.as_ref(), &metrics).await;

    // The drained deltas are gone: the store never saw them and the fresh
    // accumulator starts empty. The observable count falls back to the
    // durable truth.
    assert_eq!(store.play_count(&id), Some(0));
    assert_eq!(cache.pending_diff(&id), 0);
    assert_eq!(cache.list_with_counts()[0].play_count, 0);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_completed, 1);
    assert_eq!(snapshot.flush_errors, 1);
    assert_eq!(snapshot.diffs_flushed, 0);

    // The next pass proceeds normally with new traffic.
    store.set_fail_increments(false);
    cache.increment(id).await.unwrap().unwrap();
    run_pass(cache.as_ref(), &metrics).await;

    assert_eq!(store.play_count(&id), Some(1));
    assert_eq!(cache.cached(&id).unwrap().play_count, 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_completed, 2);
    assert_eq!(snapshot.diffs_flushed, 1);
}

#[tokio::test]
async fn failed_refresh_is_counted_and_retried() {
    init_tracing();
    let (store, cache) = new_cache();
    store.insert(Song::new("Glory Box", "Portishead"));

    store.set_fail_reads(true);
    let metrics = ReconcilerMetrics::new();
    run_pass(cache.as_ref(), &metrics).await;

    assert!(cache.song_ids().is_empty());
    assert_eq!(metrics.snapshot().refresh_errors, 1);

    store.set_fail_reads(false);
    run_pass(cache.as_ref(), &metrics).await;

    assert_eq!(cache.song_ids().len(), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_completed, 2);
    assert_eq!(snapshot.refresh_errors, 1);
    assert_eq!(snapshot.songs_changed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_read_throughs_create_one_entry() {
    init_tracing();
    let (store, cache) = new_cache();

    let song = Song::new("Sour Times", "Portishead");
    let id = song.song_id;
    store.insert(song);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.increment(id).await.unwrap().unwrap() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Exactly one cache entry; both increments reflected.
    assert_eq!(cache.song_ids().len(), 1);
    assert_eq!(cache.pending_diff(&id), 2);
    assert_eq!(cache.list_with_counts()[0].play_count, 2);
}

#[tokio::test]
async fn counts_stay_exact_across_a_mid_stream_pass() {
    init_tracing();
    let (store, cache) = new_cache();

    let song = Song::new("Mysterons", "Portishead");
    let id = song.song_id;
    store.insert(song.clone());
    cache.insert(song);

    let metrics = ReconcilerMetrics::new();
    let mut last = 0;
    for plays in 1..=10i64 {
        cache.increment(id).await.unwrap().unwrap();
        if plays == 5 {
            run_pass(cache.as_ref(), &metrics).await;
        }
        let listed = cache.list_with_counts()[0].play_count;
        assert_eq!(listed, plays);
        assert!(listed >= last);
        last = listed;
    }

    run_pass(cache.as_ref(), &metrics).await;
    assert_eq!(store.play_count(&id), Some(10));
    assert_eq!(cache.list_with_counts()[0].play_count, 10);
}

#[tokio::test]
async fn task_runs_passes_and_shuts_down() {
    init_tracing();
    let (store, cache) = new_cache();

    let song = Song::new("Wandering Star", "Portishead");
    let id = song.song_id;
    store.insert(song.clone());
    cache.insert(song);
    cache.increment(id).await.unwrap().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(reconciler_task(
        Arc::clone(&cache),
        ReconcilerConfig::new(Duration::from_millis(20)),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(120)).await;
    shutdown_tx.send(true).unwrap();
    let metrics = handle.await.unwrap();

    assert!(metrics.snapshot().passes_completed >= 1);
    assert_eq!(store.play_count(&id), Some(1));
    assert_eq!(cache.cached(&id).unwrap().play_count, 1);
}
