//! Submission seam between request handlers and the analysis backend.
//!
//! The bridge only ever submits work; execution happens out of process and
//! reports back through the registry. [`JobSubmitter`] is the trait the
//! bridge holds so tests can swap in a recorder.

use async_trait::async_trait;
use deckd_core::analysis::StageFlags;
use deckd_core::callback::CallbackMetadata;
use deckd_db::models::job::AnalysisJob;
use deckd_db::models::status::JobPriority;

use crate::error::RegistryError;
use crate::registry::{CreateJob, JobRegistry};

/// Submit analysis work tied to a track.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(
        &self,
        file_path: &str,
        stages: StageFlags,
        priority: JobPriority,
        callback: CallbackMetadata,
    ) -> Result<AnalysisJob, RegistryError>;
}

#[async_trait]
impl JobSubmitter for JobRegistry {
    /// Creates the job row. The id is derived from the callback when it
    /// names a request, so a re-sent request never queues twice.
    async fn submit(
        &self,
        file_path: &str,
        stages: StageFlags,
        priority: JobPriority,
        callback: CallbackMetadata,
    ) -> Result<AnalysisJob, RegistryError> {
        let id = callback
            .job_key()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.create(CreateJob {
            id,
            track_id: callback.track_id,
            file_path: file_path.to_string(),
            stages,
            priority,
            callback_metadata: Some(callback.to_value()),
        })
        .await
    }
}
