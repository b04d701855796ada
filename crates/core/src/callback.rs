//! Correlation data attached to analysis jobs.
//!
//! When the bridge triggers a job on behalf of a peer request it stores a
//! [`CallbackMetadata`] on the job. Once the job completes, the bridge reads
//! it back to know which reply to push and under which request id.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Job spawned to answer a `getTrackInfo` request.
pub const PURPOSE_TRACK_INFO: &str = "track_info";

/// Stem-separation job spawned by a `getTrackInfo` request with stems.
pub const PURPOSE_STEMS: &str = "stems";

/// Job created by a bulk re-analysis run; nobody waits on it.
pub const PURPOSE_REANALYSIS: &str = "reanalysis";

/// Typed view of a job's `callback_metadata` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMetadata {
    pub purpose: String,
    pub track_id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CallbackMetadata {
    pub fn new(purpose: &str, track_id: DbId, request_id: Option<String>) -> Self {
        Self {
            purpose: purpose.to_string(),
            track_id,
            request_id,
        }
    }

    /// Serialize into the opaque JSON stored on the job row.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    /// Read back from a job row. Returns `None` for metadata written by
    /// other submitters in a different shape.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Deterministic job identifier for this submission, if it is tied to a
    /// peer request. Re-sending the same request maps onto the same job.
    pub fn job_key(&self) -> Option<String> {
        self.request_id
            .as_ref()
            .map(|rid| format!("{}:{}:{}", self.purpose, self.track_id, rid))
    }
}
