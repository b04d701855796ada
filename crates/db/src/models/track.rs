//! Library track rows (read-only from this workspace).

use serde::Serialize;
use sqlx::FromRow;
use deckd_core::types::DbId;

/// A row from the `tracks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Track {
    pub id: DbId,
    pub file_path: String,
    /// Hash of the decoded audio content; the stem cache key.
    pub content_hash: Option<String>,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
    pub mode: Option<String>,
    /// JSON array of beat positions in seconds.
    pub beats: Option<String>,
    /// JSON array of downbeat positions in seconds.
    pub downbeats: Option<String>,
}

impl Track {
    /// A track counts as analysed once its tempo has been stored.
    pub fn has_analysis(&self) -> bool {
        self.bpm.is_some()
    }
}
