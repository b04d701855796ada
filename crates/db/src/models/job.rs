//! Analysis job entity and insert DTO.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use deckd_core::analysis::StageFlags;
use deckd_core::types::{DbId, JobId, Timestamp};

use super::status::{JobPriority, JobStatus};

/// A row from the `analysis_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisJob {
    pub id: JobId,
    pub track_id: DbId,
    pub file_path: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub requested_stages: Json<Vec<String>>,
    pub completed_stages: Json<Vec<String>>,
    pub stages_total: i64,
    pub progress_percent: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    pub callback_metadata: Option<Json<serde_json::Value>>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub last_updated: Timestamp,
}

impl AnalysisJob {
    /// Callback metadata as plain JSON (`Null` when none was attached).
    pub fn callback_value(&self) -> serde_json::Value {
        self.callback_metadata
            .as_ref()
            .map(|json| json.0.clone())
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn completed(&self) -> &[String] {
        &self.completed_stages.0
    }
}

/// DTO for inserting a new queued job.
#[derive(Debug, Clone)]
pub struct NewAnalysisJob {
    pub id: JobId,
    pub track_id: DbId,
    pub file_path: String,
    pub stages: StageFlags,
    pub priority: JobPriority,
    pub max_retries: i64,
    pub callback_metadata: Option<serde_json::Value>,
}

/// One cell of the status x priority histogram returned by
/// [`AnalysisJobRepo::count_by_status_and_priority`](crate::repositories::AnalysisJobRepo::count_by_status_and_priority).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct JobCount {
    pub status: JobStatus,
    pub priority: JobPriority,
    pub count: i64,
}
