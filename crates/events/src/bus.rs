//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`JobEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use deckd_db::models::job::AnalysisJob;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// What happened to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Started,
    Progress,
    Completed,
    /// A failure was recorded and the job went back to the queue.
    Requeued,
    /// A failure exhausted the retry budget.
    Failed,
    Cancelled,
}

impl JobEventKind {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "job.created",
            Self::Started => "job.started",
            Self::Progress => "job.progress",
            Self::Completed => "job.completed",
            Self::Requeued => "job.requeued",
            Self::Failed => "job.failed",
            Self::Cancelled => "job.cancelled",
        }
    }
}

/// A job state change, carrying the row as it was written.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: AnalysisJob,
    /// Stage name for [`JobEventKind::Progress`] events.
    pub stage: Option<String>,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: AnalysisJob) -> Self {
        Self {
            kind,
            job,
            stage: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the stage name that triggered a progress event.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use deckd_db::models::status::{JobPriority, JobStatus};

    fn sample_job(id: &str) -> AnalysisJob {
        let now = Utc::now();
        AnalysisJob {
            id: id.to_string(),
            track_id: 1,
            file_path: "/music/a.flac".into(),
            status: JobStatus::Completed,
            priority: JobPriority::High,
            requested_stages: Default::default(),
            completed_stages: Default::default(),
            stages_total: 0,
            progress_percent: 100,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            callback_metadata: None,
            created_at: now,
            started_at: Some(now),
            completed_at: Some(now),
            last_updated: now,
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(JobEvent::new(JobEventKind::Progress, sample_job("j1")).with_stage("tempo"));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, JobEventKind::Progress);
        assert_eq!(received.job.id, "j1");
        assert_eq!(received.stage.as_deref(), Some("tempo"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(JobEvent::new(JobEventKind::Completed, sample_job("j2")));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.job.id, "j2");
        assert_eq!(e2.kind, JobEventKind::Completed);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers; this must not panic.
        bus.publish(JobEvent::new(JobEventKind::Created, sample_job("orphan")));
    }

    #[test]
    fn event_names() {
        assert_eq!(JobEventKind::Completed.name(), "job.completed");
        assert_eq!(JobEventKind::Requeued.name(), "job.requeued");
    }
}
