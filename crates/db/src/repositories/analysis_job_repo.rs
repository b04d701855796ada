//! Repository for the `analysis_jobs` table.
//!
//! Status and priority literals come from the `JobStatus` / `JobPriority`
//! enums in `models::status`. Read-modify-write operations (stage progress,
//! failure accounting) run inside a transaction and refuse to touch rows
//! already in a terminal status.

use chrono::Utc;
use sqlx::types::Json;
use deckd_core::analysis::progress_percent;
use deckd_core::types::Timestamp;

use crate::models::job::{AnalysisJob, JobCount, NewAnalysisJob};
use crate::models::status::JobStatus;
use crate::DbPool;

/// Column list for `analysis_jobs` queries.
const COLUMNS: &str = "\
    id, track_id, file_path, status, priority, \
    requested_stages, completed_stages, stages_total, progress_percent, \
    retry_count, max_retries, last_error, callback_metadata, \
    created_at, started_at, completed_at, last_updated";

/// Priority tier sort key: high first, then normal, then low.
const PRIORITY_ORDER: &str =
    "CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END";

/// SQL list of terminal statuses.
const TERMINAL_IN: &str = "('completed', 'failed', 'cancelled')";

/// Outcome of a guarded update on a single job row.
#[derive(Debug, Clone)]
pub enum RowUpdate {
    /// No row with that id.
    Missing,
    /// The row is in a terminal status and was left untouched.
    Rejected(AnalysisJob),
    /// The update was applied; carries the row as written.
    Applied(AnalysisJob),
}

/// Provides CRUD operations for analysis jobs.
pub struct AnalysisJobRepo;

impl AnalysisJobRepo {
    /// Insert a queued job unless a row with the same id already exists.
    ///
    /// Returns `true` when a new row was written.
    pub async fn insert_if_absent(pool: &DbPool, input: &NewAnalysisJob) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let requested: Vec<String> = input
            .stages
            .requested()
            .into_iter()
            .map(str::to_string)
            .collect();

        let result = sqlx::query(
            "INSERT INTO analysis_jobs \
                 (id, track_id, file_path, status, priority, requested_stages, \
                  completed_stages, stages_total, progress_percent, retry_count, \
                  max_retries, callback_metadata, created_at, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, '[]', $7, 0, 0, $8, $9, $10, $10) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&input.id)
        .bind(input.track_id)
        .bind(&input.file_path)
        .bind(JobStatus::Queued)
        .bind(input.priority)
        .bind(Json(&requested))
        .bind(input.stages.total())
        .bind(input.max_retries)
        .bind(input.callback_metadata.as_ref().map(Json))
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<AnalysisJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysis_jobs WHERE id = $1");
        sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Queued jobs by priority tier, FIFO within a tier.
    pub async fn list_queued(pool: &DbPool, limit: i64) -> Result<Vec<AnalysisJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_jobs \
             WHERE status = $1 \
             ORDER BY {PRIORITY_ORDER}, created_at ASC, rowid ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(JobStatus::Queued)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// All processing jobs, earliest start first.
    pub async fn list_processing(pool: &DbPool) -> Result<Vec<AnalysisJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_jobs \
             WHERE status = $1 \
             ORDER BY started_at ASC, rowid ASC"
        );
        sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(JobStatus::Processing)
            .fetch_all(pool)
            .await
    }

    /// Move a non-terminal job to `status`.
    ///
    /// Entering `processing` stamps `started_at`; entering a terminal status
    /// stamps `completed_at`.
    pub async fn update_status(
        pool: &DbPool,
        id: &str,
        status: JobStatus,
    ) -> Result<RowUpdate, sqlx::Error> {
        let now = Utc::now();
        let started_at: Option<Timestamp> = (status == JobStatus::Processing).then_some(now);
        let completed_at: Option<Timestamp> = status.is_terminal().then_some(now);

        let query = format!(
            "UPDATE analysis_jobs \
             SET status = $2, \
                 started_at = COALESCE($3, started_at), \
                 completed_at = COALESCE($4, completed_at), \
                 last_updated = $5 \
             WHERE id = $1 AND status NOT IN {TERMINAL_IN} \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .bind(status)
            .bind(started_at)
            .bind(completed_at)
            .bind(now)
            .fetch_optional(pool)
            .await?;

        match updated {
            Some(job) => Ok(RowUpdate::Applied(job)),
            None => Self::missing_or_rejected(pool, id).await,
        }
    }

    /// Add `stage` to the completed set (if absent) and recompute progress.
    pub async fn record_stage(pool: &DbPool, id: &str, stage: &str) -> Result<RowUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM analysis_jobs WHERE id = $1");
        let Some(job) = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(RowUpdate::Missing);
        };

        if job.status.is_terminal() {
            return Ok(RowUpdate::Rejected(job));
        }

        let mut completed = job.completed_stages.0.clone();
        if !completed.iter().any(|s| s == stage) {
            completed.push(stage.to_string());
        }
        let percent = progress_percent(completed.len(), job.stages_total);

        let query = format!(
            "UPDATE analysis_jobs \
             SET completed_stages = $2, progress_percent = $3, last_updated = $4 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .bind(Json(&completed))
            .bind(percent)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RowUpdate::Applied(updated))
    }

    /// Count one failed attempt.
    ///
    /// Once `retry_count` reaches `max_retries` the job becomes `failed` with
    /// `completed_at` stamped; otherwise it goes back to `queued`. Either way
    /// `last_error` is recorded.
    pub async fn record_failure(
        pool: &DbPool,
        id: &str,
        message: &str,
    ) -> Result<RowUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM analysis_jobs WHERE id = $1");
        let Some(job) = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(RowUpdate::Missing);
        };

        if job.status.is_terminal() {
            return Ok(RowUpdate::Rejected(job));
        }

        let now = Utc::now();
        let retry_count = job.retry_count + 1;
        let exhausted = retry_count >= job.max_retries;
        let (status, completed_at) = if exhausted {
            (JobStatus::Failed, Some(now))
        } else {
            (JobStatus::Queued, None)
        };

        let query = format!(
            "UPDATE analysis_jobs \
             SET status = $2, retry_count = $3, last_error = $4, \
                 completed_at = $5, last_updated = $6 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .bind(status)
            .bind(retry_count)
            .bind(message)
            .bind(completed_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RowUpdate::Applied(updated))
    }

    /// Delete a single job. Returns `true` if a row was removed.
    pub async fn delete(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM analysis_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete terminal jobs that finished before `cutoff`.
    pub async fn purge_terminal_before(pool: &DbPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let query = format!(
            "DELETE FROM analysis_jobs \
             WHERE status IN {TERMINAL_IN} AND completed_at IS NOT NULL AND completed_at < $1"
        );
        let result = sqlx::query(&query).bind(cutoff).execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Job counts grouped by status and priority.
    pub async fn count_by_status_and_priority(pool: &DbPool) -> Result<Vec<JobCount>, sqlx::Error> {
        sqlx::query_as::<_, JobCount>(
            "SELECT status, priority, COUNT(*) AS count \
             FROM analysis_jobs \
             GROUP BY status, priority \
             ORDER BY status, priority",
        )
        .fetch_all(pool)
        .await
    }

    // ---- private helpers ----

    /// Distinguish "no such row" from "row exists but is terminal" after a
    /// guarded UPDATE matched nothing.
    async fn missing_or_rejected(pool: &DbPool, id: &str) -> Result<RowUpdate, sqlx::Error> {
        Ok(match Self::find_by_id(pool, id).await? {
            Some(job) => RowUpdate::Rejected(job),
            None => RowUpdate::Missing,
        })
    }
}
