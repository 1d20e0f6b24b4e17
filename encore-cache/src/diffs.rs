//! Play-count diff accumulator with generation rotation.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use encore_core::SongId;

/// One generation of pending play-count deltas.
pub type DiffGeneration = Arc<DashMap<SongId, i64>>;

/// Accumulator for not-yet-persisted play-count deltas.
///
/// The container is swapped whole, never cleared in place: `add` holds the
/// read half of the generation lock across its per-key update, and
/// `drain_and_reset` holds the write half across the swap. An increment
/// therefore lands entirely in whichever generation was current when it
/// acquired the lock: drained exactly once, or left for the next cycle,
/// never both and never neither.
///
/// Guards are only ever held around non-blocking map operations, never across
/// an `.await`.
#[derive(Debug)]
pub struct PlayCountDiffs {
    current: RwLock<DiffGeneration>,
}

impl PlayCountDiffs {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(DashMap::new())),
        }
    }

    /// Atomically create-or-increment the delta for a song.
    ///
    /// Returns the accumulated value after the update, so the caller can
    /// produce a consistent `base + diff` view without a second lookup.
    pub fn add(&self, id: SongId, delta: i64) -> i64 {
        let generation = self.current.read().unwrap();
        let mut pending = generation.entry(id).or_insert(0);
        *pending += delta;
        *pending
    }

    /// Pending delta for one song, 0 if none.
    pub fn pending(&self, id: &SongId) -> i64 {
        let generation = self.current.read().unwrap();
        generation.get(id).map(|entry| *entry.value()).unwrap_or(0)
    }

    /// Handle to the current generation for bulk reads.
    pub fn snapshot(&self) -> DiffGeneration {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Swap in a fresh generation and return the previous one whole.
    pub fn drain_and_reset(&self) -> DiffGeneration {
        let mut generation = self.current.write().unwrap();
        std::mem::replace(&mut *generation, Arc::new(DashMap::new()))
    }
}

impl Default for PlayCountDiffs {
    fn default() -> Self {
        Self::new()
    }
}
