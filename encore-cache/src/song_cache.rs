//! Song cache facade: the single entry point for request handlers.

use std::sync::Arc;

use encore_core::{EncoreError, EncoreResult, Song, SongId, SongWithPlays};
use tracing::debug;

use crate::diffs::{DiffGeneration, PlayCountDiffs};
use crate::durable::DurableStore;
use crate::store::ReadCache;

/// Read facade over the song cache.
///
/// Composes the read cache with the pending-diff accumulator: reads are
/// served from memory, play-count increments accumulate locally, and the
/// reconciler merges both directions with the durable store in the
/// background. Handlers and the reconciler task share one instance behind an
/// `Arc`; every operation is safe for concurrent invocation.
///
/// The facade talks to the durable store in exactly one place: the
/// read-through on an `increment` cache miss. Everything else is pure memory.
pub struct SongCache<D: DurableStore> {
    durable: Arc<D>,
    songs: ReadCache,
    diffs: PlayCountDiffs,
}

impl<D: DurableStore> SongCache<D> {
    /// Create a cache reading through to the given durable store.
    pub fn new(durable: Arc<D>) -> Self {
        Self {
            durable,
            songs: ReadCache::new(),
            diffs: PlayCountDiffs::new(),
        }
    }

    /// Handle to the durable store this cache reads through to.
    pub fn durable(&self) -> &Arc<D> {
        &self.durable
    }

    /// Seed the cache from an initial durable read, typically at startup.
    ///
    /// Existing entries win: a seed never clobbers a snapshot that request
    /// traffic already put in place.
    pub fn warm_start(&self, songs: Vec<Song>) {
        let seeded = songs.len();
        for song in songs {
            self.songs.put_if_absent(song);
        }
        debug!(songs = seeded, "Read cache seeded");
    }

    /// Every cached song with its effective play count, sorted by title.
    ///
    /// The effective count is `base + pending diff (0 if none)`. The result
    /// is a fresh value-typed snapshot on every call.
    pub fn list_with_counts(&self) -> Vec<SongWithPlays> {
        let pending = self.diffs.snapshot();
        let mut views: Vec<SongWithPlays> = self
            .songs
            .list_all()
            .into_iter()
            .map(|song| {
                let diff = pending
                    .get(&song.song_id)
                    .map(|entry| *entry.value())
                    .unwrap_or(0);
                song.with_play_count(song.play_count + diff)
            })
            .collect();
        views.sort_by(|a, b| a.title.cmp(&b.title));
        views
    }

    /// Insert a song that was just durably created elsewhere.
    ///
    /// No diff exists yet for a brand-new id, so the returned view carries
    /// the base count unchanged.
    pub fn insert(&self, song: Song) -> SongWithPlays {
        let view = song.with_play_count(song.play_count);
        self.songs.put_if_absent(song);
        view
    }

    /// Record one play for a song.
    ///
    /// On a cache miss this reads through to the durable store for the single
    /// id. `Ok(None)` means the song exists nowhere; nothing is cached and no
    /// diff is accumulated. A store failure during the read-through surfaces
    /// as `Err`, distinct from not-found. No lock shared with other facade
    /// operations is held while the read-through I/O is outstanding.
    pub async fn increment(&self, id: SongId) -> EncoreResult<Option<SongWithPlays>> {
        if self.songs.get(&id).is_none() {
            match self.durable.read_one(id).await? {
                Some(song) => {
                    // A racing increment may have inserted already; first
                    // write wins and both callers accumulate their diff.
                    self.songs.put_if_absent(song);
                }
                None => return Ok(None),
            }
        }

        let total = self.diffs.add(id, 1);
        let song = self
            .songs
            .get(&id)
            .ok_or_else(|| EncoreError::Invariant {
                reason: format!("song {id} vanished from the read cache"),
            })?;
        Ok(Some(song.with_play_count(song.play_count + total)))
    }

    /// Merge a single authoritative song into the cache.
    ///
    /// Returns whether the cached snapshot changed. Change detection is
    /// counter-based: the store's copy of the other fields rides along only
    /// when the count moved. A song not in the cache is left alone.
    pub fn refresh_one(&self, song_from_store: Song) -> bool {
        match self.songs.get(&song_from_store.song_id) {
            Some(existing) => {
                existing.play_count != song_from_store.play_count
                    && self.songs.compare_and_update(&existing, song_from_store)
            }
            None => false,
        }
    }

    /// Merge the full authoritative song set into the cache.
    ///
    /// Called by the reconciler after each flush. Absent songs are inserted;
    /// present songs are updated via compare-and-swap against the snapshot
    /// read just before, so a concurrent read-through insert is never
    /// clobbered. Returns the number of inserts and updates that actually
    /// landed; a lost race is not counted.
    pub fn bulk_merge(&self, songs_from_store: Vec<Song>) -> usize {
        let mut changed = 0;
        for incoming in songs_from_store {
            match self.songs.get(&incoming.song_id) {
                None => {
                    if self.songs.put_if_absent(incoming) {
                        changed += 1;
                    }
                }
                Some(existing) => {
                    if existing.play_count != incoming.play_count
                        && self.songs.compare_and_update(&existing, incoming)
                    {
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Swap out the pending-diff generation for flushing.
    ///
    /// Called only by the reconciler, once per pass. Increments racing with
    /// the swap land in the fresh generation and are flushed next cycle.
    pub fn drain_pending(&self) -> DiffGeneration {
        self.diffs.drain_and_reset()
    }

    /// Pending (unflushed) delta for one song, 0 if none.
    pub fn pending_diff(&self, id: &SongId) -> i64 {
        self.diffs.pending(id)
    }

    /// Cached base snapshot for one song.
    pub fn cached(&self, id: &SongId) -> Option<Song> {
        self.songs.get(id)
    }

    /// Ids currently cached.
    pub fn song_ids(&self) -> Vec<SongId> {
        self.songs.list_ids()
    }
}
