//! Repository for the `tracks` table.

use deckd_core::types::DbId;

use crate::models::track::Track;
use crate::DbPool;

/// Column list for `tracks` queries.
const COLUMNS: &str = "id, file_path, content_hash, bpm, musical_key, mode, beats, downbeats";

/// Read-only access to library tracks.
pub struct TrackRepo;

impl TrackRepo {
    /// Find a track by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Track>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tracks WHERE id = $1");
        sqlx::query_as::<_, Track>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
