//! Concurrency-safe read cache for song snapshots.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use encore_core::{Song, SongId};

/// Read cache holding the last-known-durable snapshot of every song.
///
/// All operations are single-key atomic and safe under unbounded concurrent
/// callers with no external locking. Values are cloned out; references to
/// internal state never escape.
#[derive(Debug, Default)]
pub struct ReadCache {
    songs: DashMap<SongId, Song>,
}

impl ReadCache {
    /// Create an empty read cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a song snapshot by id.
    pub fn get(&self, id: &SongId) -> Option<Song> {
        self.songs.get(id).map(|entry| entry.value().clone())
    }

    /// Insert only if no entry exists for the song's id.
    ///
    /// Returns whether the insert landed. Racing callers agree on a single
    /// winner; the loser's copy is dropped.
    pub fn put_if_absent(&self, song: Song) -> bool {
        match self.songs.entry(song.song_id) {
            Entry::Vacant(slot) => {
                slot.insert(song);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Atomically replace the stored song only if it still equals `expected`.
    ///
    /// Returns whether the swap happened. A `false` return means the entry
    /// was concurrently modified (or never existed) and the caller's
    /// expectation is stale.
    pub fn compare_and_update(&self, expected: &Song, new_song: Song) -> bool {
        match self.songs.entry(new_song.song_id) {
            Entry::Occupied(mut slot) => {
                if slot.get() == expected {
                    slot.insert(new_song);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of every cached song.
    pub fn list_all(&self) -> Vec<Song> {
        self.songs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Ids of every cached song.
    pub fn list_ids(&self) -> Vec<SongId> {
        self.songs.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of cached songs.
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Whether the cache holds no songs.
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
