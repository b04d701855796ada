//! Completion path: job events from the registry become pushes to the
//! playback engine.

use std::sync::Arc;

use deckd_core::callback::{CallbackMetadata, PURPOSE_STEMS, PURPOSE_TRACK_INFO};
use deckd_events::{JobEvent, JobEventKind};
use tokio::sync::broadcast;

use crate::bridge::Bridge;

impl Bridge {
    /// Consume job events until the bus closes.
    ///
    /// A completed `track_info` job pushes the track info its request was
    /// waiting for; a completed `stems` job pushes `stemsReady` once the
    /// stem cache holds the entry.
    pub async fn run_notifications(self: Arc<Self>, mut receiver: broadcast::Receiver<JobEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.on_job_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Bridge notifications lagged, some completions were missed");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, bridge notifications shutting down");
                    break;
                }
            }
        }
    }

    pub(crate) async fn on_job_event(&self, event: &JobEvent) {
        if event.kind != JobEventKind::Completed {
            return;
        }
        let Some(callback) = event
            .job
            .callback_metadata
            .as_ref()
            .and_then(|meta| CallbackMetadata::from_value(&meta.0))
        else {
            return;
        };

        tracing::debug!(job_id = %event.job.id, purpose = %callback.purpose, "Job completed for playback request");
        match callback.purpose.as_str() {
            PURPOSE_TRACK_INFO => {
                self.send_track_info(callback.track_id, callback.request_id).await;
            }
            PURPOSE_STEMS => self.notify_stems(callback).await,
            _ => {}
        }
    }

    async fn notify_stems(&self, callback: CallbackMetadata) {
        let track = match self.tracks.get(callback.track_id).await {
            Ok(Some(track)) => track,
            Ok(None) => {
                tracing::warn!(track_id = callback.track_id, "Stems finished for a track that no longer exists");
                return;
            }
            Err(e) => {
                tracing::error!(track_id = callback.track_id, error = %e, "Track lookup failed");
                return;
            }
        };

        match self.cached_stems_path(&track).await {
            Some(path) => {
                self.send_stems_ready(track.id, path, callback.request_id);
            }
            None => {
                tracing::warn!(track_id = track.id, "Stems job completed but the stem cache has no entry");
            }
        }
    }
}
