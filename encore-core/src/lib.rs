//! Encore Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod error;
pub mod song;

pub use error::{EncoreError, EncoreResult, StoreError};
pub use song::{Song, SongWithPlays};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Song identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type SongId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 SongId (timestamp-sortable).
pub fn new_song_id() -> SongId {
    Uuid::now_v7()
}
