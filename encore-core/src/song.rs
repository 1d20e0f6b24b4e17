//! Song entity and its external view.

use crate::{SongId, Timestamp};
use serde::{Deserialize, Serialize};

/// Song - a catalog record as last confirmed by the durable store.
///
/// `play_count` here is the *base* count: the value the durable store held the
/// last time this snapshot was read. Pending increments live outside this type
/// and are folded in when a [`SongWithPlays`] view is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub play_count: i64,
    pub created_at: Timestamp,
}

impl Song {
    /// Create a new song with a fresh id and a zero base count.
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            song_id: crate::new_song_id(),
            title: title.into(),
            artist: artist.into(),
            play_count: 0,
            created_at: chrono::Utc::now(),
        }
    }

    /// Produce the external view with the given effective play count.
    pub fn with_play_count(&self, play_count: i64) -> SongWithPlays {
        SongWithPlays {
            song_id: self.song_id,
            title: self.title.clone(),
            artist: self.artist.clone(),
            play_count,
        }
    }
}

/// Externally visible song view.
///
/// The `play_count` carried here is always `base + pending diff` at the moment
/// the view was produced. Value-typed: callers own it outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongWithPlays {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub play_count: i64,
}
