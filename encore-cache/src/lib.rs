//! Encore Cache - Read Cache with Batched Write-Back
//!
//! Serves all song reads from memory, absorbs play-count increments locally,
//! and reconciles both directions with the durable store on a fixed interval.
//!
//! The facade [`SongCache`] is the only entry point for request handlers. The
//! background [`reconciler_task`] periodically flushes accumulated play-count
//! diffs to the [`DurableStore`] and refreshes the cache from it. The
//! externally observed count for any song is always `base + pending diff`.
//!
//! Both the facade and the reconciler are handed their collaborators at
//! construction; there is no ambient global state.

pub mod diffs;
pub mod durable;
pub mod reconciler;
pub mod song_cache;
pub mod store;

pub use diffs::{DiffGeneration, PlayCountDiffs};
pub use durable::{DurableStore, InMemoryDurableStore};
pub use reconciler::{
    reconciler_task, run_pass, ReconcilerConfig, ReconcilerMetrics, ReconcilerSnapshot,
    DEFAULT_SYNC_INTERVAL_SECS,
};
pub use song_cache::SongCache;
pub use store::ReadCache;
