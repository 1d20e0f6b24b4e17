//! Durable store collaborator trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use encore_core::{Song, SongId, StoreError};

/// Authoritative storage for songs and their base play counts.
///
/// The cache core is the only consumer: read-through uses `read_one`, the
/// reconciler uses `read_all` and `apply_increment`. Implementations must be
/// safe for concurrent use. Idempotency of `apply_increment` is NOT assumed;
/// the reconciler delivers each drained diff at most once.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the full song set with base counts as currently stored.
    async fn read_all(&self) -> Result<Vec<Song>, StoreError>;

    /// Read a single song, `Ok(None)` when absent.
    async fn read_one(&self, id: SongId) -> Result<Option<Song>, StoreError>;

    /// Apply a signed play-count increment to one song.
    ///
    /// Incrementing an id the store does not know is a silent no-op, matching
    /// a relational `UPDATE ... WHERE id = _` that touches zero rows.
    async fn apply_increment(&self, id: SongId, delta: i64) -> Result<(), StoreError>;
}

/// In-memory durable store for tests and local development.
///
/// Reads and writes go through a single `RwLock`ed map; values are cloned
/// out. The `set_fail_*` toggles inject transient failures so callers can
/// exercise their recovery paths.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    songs: RwLock<HashMap<SongId, Song>>,
    fail_reads: AtomicBool,
    fail_increments: AtomicBool,
}

impl InMemoryDurableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a song, replacing any existing snapshot for its id.
    pub fn insert(&self, song: Song) {
        self.songs.write().unwrap().insert(song.song_id, song);
    }

    /// Current stored snapshot for one song.
    pub fn get(&self, id: &SongId) -> Option<Song> {
        self.songs.read().unwrap().get(id).cloned()
    }

    /// Stored base play count for one song.
    pub fn play_count(&self, id: &SongId) -> Option<i64> {
        self.songs.read().unwrap().get(id).map(|s| s.play_count)
    }

    /// Number of stored songs.
    pub fn song_count(&self) -> usize {
        self.songs.read().unwrap().len()
    }

    /// Make subsequent `read_all`/`read_one` calls fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `apply_increment` calls fail.
    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn read_all(&self) -> Result<Vec<Song>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed {
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.songs.read().unwrap().values().cloned().collect())
    }

    async fn read_one(&self, id: SongId) -> Result<Option<Song>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed {
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.songs.read().unwrap().get(&id).cloned())
    }

    async fn apply_increment(&self, id: SongId, delta: i64) -> Result<(), StoreError> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(StoreError::IncrementFailed {
                id,
                reason: "injected increment failure".to_string(),
            });
        }
        let mut songs = self.songs.write().unwrap();
        if let Some(song) = songs.get_mut(&id) {
            song.play_count += delta;
        }
        Ok(())
    }
}
