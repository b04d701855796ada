//! Read-only track lookup used by request handling.

use async_trait::async_trait;
use deckd_core::types::DbId;
use deckd_db::models::track::Track;
use deckd_db::repositories::TrackRepo;
use deckd_db::DbPool;

use crate::error::BridgeError;

/// Resolve a track by id.
#[async_trait]
pub trait TrackLookup: Send + Sync {
    async fn get(&self, id: DbId) -> Result<Option<Track>, BridgeError>;
}

/// [`TrackLookup`] over the `tracks` table.
pub struct DbTrackLookup {
    pool: DbPool,
}

impl DbTrackLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackLookup for DbTrackLookup {
    async fn get(&self, id: DbId) -> Result<Option<Track>, BridgeError> {
        Ok(TrackRepo::find_by_id(&self.pool, id).await?)
    }
}
