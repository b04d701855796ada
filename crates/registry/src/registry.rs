//! The job registry service.

use std::sync::Arc;

use serde::Serialize;
use deckd_core::analysis::StageFlags;
use deckd_core::callback::{CallbackMetadata, PURPOSE_REANALYSIS};
use deckd_core::types::DbId;
use deckd_db::models::job::{AnalysisJob, JobCount, NewAnalysisJob};
use deckd_db::models::status::{JobPriority, JobStatus};
use deckd_db::repositories::{AnalysisJobRepo, RowUpdate};
use deckd_db::DbPool;
use deckd_events::{EventBus, JobEvent, JobEventKind};

use crate::error::RegistryError;

/// Default number of attempts before a job is marked `failed`.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

/// Tunables for [`JobRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Attempts allowed per job; stamped on each row at creation.
    pub max_retries: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Input for [`JobRegistry::create`].
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub id: String,
    pub track_id: DbId,
    pub file_path: String,
    pub stages: StageFlags,
    pub priority: JobPriority,
    pub callback_metadata: Option<serde_json::Value>,
}

/// Result of [`JobRegistry::record_failure`].
#[derive(Debug, Clone)]
pub enum FailureOutcome {
    /// Budget remains; the job is back in the queue.
    WillRetry(AnalysisJob),
    /// The retry budget is spent; the job is now `failed`.
    Exhausted(AnalysisJob),
}

impl FailureOutcome {
    pub fn job(&self) -> &AnalysisJob {
        match self {
            Self::WillRetry(job) | Self::Exhausted(job) => job,
        }
    }
}

/// Job counts by status and priority, for observability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub counts: Vec<JobCount>,
}

impl JobStats {
    /// Count for one status x priority cell (0 when absent).
    pub fn count(&self, status: JobStatus, priority: JobPriority) -> i64 {
        self.counts
            .iter()
            .find(|c| c.status == status && c.priority == priority)
            .map_or(0, |c| c.count)
    }

    /// Total jobs in `status` across all priorities.
    pub fn by_status(&self, status: JobStatus) -> i64 {
        self.counts
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.count)
            .sum()
    }

    pub fn total(&self) -> i64 {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// Durable state machine over analysis jobs.
///
/// Cheap to share via `Arc`; holds a pool handle and the event bus.
pub struct JobRegistry {
    pool: DbPool,
    bus: Arc<EventBus>,
    config: RegistryConfig,
}

impl JobRegistry {
    pub fn new(pool: DbPool, bus: Arc<EventBus>, config: RegistryConfig) -> Self {
        Self { pool, bus, config }
    }

    /// Create a queued job, or return the existing row if `id` is taken.
    ///
    /// Only a freshly inserted row publishes a `created` event.
    pub async fn create(&self, input: CreateJob) -> Result<AnalysisJob, RegistryError> {
        let row = NewAnalysisJob {
            id: input.id,
            track_id: input.track_id,
            file_path: input.file_path,
            stages: input.stages,
            priority: input.priority,
            max_retries: self.config.max_retries,
            callback_metadata: input.callback_metadata,
        };

        let inserted = AnalysisJobRepo::insert_if_absent(&self.pool, &row).await?;
        let job = AnalysisJobRepo::find_by_id(&self.pool, &row.id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(row.id.clone()))?;

        if inserted {
            tracing::info!(
                job_id = %job.id,
                track_id = job.track_id,
                priority = %job.priority,
                stages_total = job.stages_total,
                "Analysis job queued",
            );
            self.publish(JobEvent::new(JobEventKind::Created, job.clone()));
        } else {
            tracing::debug!(job_id = %job.id, "Analysis job already exists, returning existing row");
        }
        Ok(job)
    }

    /// Fetch a single job.
    pub async fn find(&self, id: &str) -> Result<Option<AnalysisJob>, RegistryError> {
        Ok(AnalysisJobRepo::find_by_id(&self.pool, id).await?)
    }

    /// Queued jobs, high tier first, FIFO within a tier, at most `limit`.
    pub async fn list_queued(&self, limit: i64) -> Result<Vec<AnalysisJob>, RegistryError> {
        Ok(AnalysisJobRepo::list_queued(&self.pool, limit).await?)
    }

    /// Processing jobs ordered by start time.
    pub async fn list_processing(&self) -> Result<Vec<AnalysisJob>, RegistryError> {
        Ok(AnalysisJobRepo::list_processing(&self.pool).await?)
    }

    /// Transition a job to `status`.
    ///
    /// Terminal jobs are sinks: moving one anywhere returns
    /// [`RegistryError::InvalidTransition`] and leaves the row untouched.
    pub async fn set_status(&self, id: &str, status: JobStatus) -> Result<AnalysisJob, RegistryError> {
        let job = match AnalysisJobRepo::update_status(&self.pool, id, status).await? {
            RowUpdate::Applied(job) => job,
            RowUpdate::Missing => return Err(RegistryError::NotFound(id.to_string())),
            RowUpdate::Rejected(job) => {
                return Err(RegistryError::InvalidTransition {
                    id: job.id,
                    from: job.status,
                    to: status.as_str(),
                })
            }
        };

        tracing::info!(job_id = %job.id, status = %job.status, "Analysis job status changed");

        let kind = match status {
            JobStatus::Queued => JobEventKind::Requeued,
            JobStatus::Processing => JobEventKind::Started,
            JobStatus::Completed => JobEventKind::Completed,
            JobStatus::Failed => JobEventKind::Failed,
            JobStatus::Cancelled => JobEventKind::Cancelled,
        };
        self.publish(JobEvent::new(kind, job.clone()));
        Ok(job)
    }

    /// Cancel a queued or processing job.
    pub async fn cancel(&self, id: &str) -> Result<AnalysisJob, RegistryError> {
        self.set_status(id, JobStatus::Cancelled).await
    }

    /// Mark `stage` as done. Repeating a stage changes nothing but
    /// `last_updated`.
    pub async fn record_progress(&self, id: &str, stage: &str) -> Result<AnalysisJob, RegistryError> {
        let job = match AnalysisJobRepo::record_stage(&self.pool, id, stage).await? {
            RowUpdate::Applied(job) => job,
            RowUpdate::Missing => return Err(RegistryError::NotFound(id.to_string())),
            RowUpdate::Rejected(job) => {
                return Err(RegistryError::InvalidTransition {
                    id: job.id,
                    from: job.status,
                    to: "progress",
                })
            }
        };

        tracing::debug!(
            job_id = %job.id,
            stage,
            progress_percent = job.progress_percent,
            "Analysis stage recorded",
        );
        self.publish(JobEvent::new(JobEventKind::Progress, job.clone()).with_stage(stage));
        Ok(job)
    }

    /// Record a failed attempt and decide between retry and give-up.
    pub async fn record_failure(&self, id: &str, message: &str) -> Result<FailureOutcome, RegistryError> {
        let job = match AnalysisJobRepo::record_failure(&self.pool, id, message).await? {
            RowUpdate::Applied(job) => job,
            RowUpdate::Missing => return Err(RegistryError::NotFound(id.to_string())),
            RowUpdate::Rejected(job) => {
                return Err(RegistryError::InvalidTransition {
                    id: job.id,
                    from: job.status,
                    to: "failure",
                })
            }
        };

        if job.status == JobStatus::Failed {
            tracing::warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                error = message,
                "Analysis job failed, retry budget exhausted",
            );
            self.publish(JobEvent::new(JobEventKind::Failed, job.clone()));
            Ok(FailureOutcome::Exhausted(job))
        } else {
            tracing::info!(
                job_id = %job.id,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                error = message,
                "Analysis job failed, requeued",
            );
            self.publish(JobEvent::new(JobEventKind::Requeued, job.clone()));
            Ok(FailureOutcome::WillRetry(job))
        }
    }

    /// Delete one job regardless of status. Returns `false` if absent.
    pub async fn remove(&self, id: &str) -> Result<bool, RegistryError> {
        Ok(AnalysisJobRepo::delete(&self.pool, id).await?)
    }

    /// Delete terminal jobs that finished more than `older_than` ago.
    pub async fn purge(&self, older_than: chrono::Duration) -> Result<u64, RegistryError> {
        let cutoff = chrono::Utc::now() - older_than;
        let purged = AnalysisJobRepo::purge_terminal_before(&self.pool, cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged finished analysis jobs");
        }
        Ok(purged)
    }

    pub async fn stats(&self) -> Result<JobStats, RegistryError> {
        let counts = AnalysisJobRepo::count_by_status_and_priority(&self.pool).await?;
        Ok(JobStats { counts })
    }

    /// Queue a fresh job for every track. Each gets a new random id, so
    /// re-running a re-analysis always adds work.
    pub async fn enqueue_reanalysis(
        &self,
        tracks: &[(DbId, String)],
        stages: StageFlags,
        priority: JobPriority,
    ) -> Result<Vec<AnalysisJob>, RegistryError> {
        let mut jobs = Vec::with_capacity(tracks.len());
        for (track_id, file_path) in tracks {
            let callback = CallbackMetadata::new(PURPOSE_REANALYSIS, *track_id, None);
            let job = self
                .create(CreateJob {
                    id: uuid::Uuid::new_v4().to_string(),
                    track_id: *track_id,
                    file_path: file_path.clone(),
                    stages,
                    priority,
                    callback_metadata: Some(callback.to_value()),
                })
                .await?;
            jobs.push(job);
        }
        tracing::info!(count = jobs.len(), priority = %priority, "Re-analysis enqueued");
        Ok(jobs)
    }

    fn publish(&self, event: JobEvent) {
        tracing::trace!(event = event.kind.name(), job_id = %event.job.id, "Publishing job event");
        self.bus.publish(event);
    }
}
