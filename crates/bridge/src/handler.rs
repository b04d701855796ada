//! Inbound request handling.
//!
//! Every path ends in exactly one reply (or none for handshake traffic);
//! failures are answered with an [`ErrorReply`](crate::messages::ErrorReply)
//! rather than propagated.

use deckd_core::analysis::StageFlags;
use deckd_core::callback::{CallbackMetadata, PURPOSE_STEMS, PURPOSE_TRACK_INFO};
use deckd_core::timing::parse_timing;
use deckd_core::types::DbId;
use deckd_db::models::status::JobPriority;
use deckd_db::models::track::Track;
use deckd_registry::JobSubmitter;

use crate::bridge::Bridge;
use crate::messages::{
    parse_inbound, GetTrackInfo, Inbound, ParseError, StemsReady, TrackInfoReply,
    ERR_ANALYSIS_IN_PROGRESS, ERR_FILE_NOT_ACCESSIBLE, ERR_INVALID_REQUEST, ERR_LOOKUP_FAILED,
    ERR_QUEUE_FAILED, ERR_TRACK_NOT_FOUND,
};

impl Bridge {
    /// Dispatch one inbound text frame.
    pub(crate) async fn handle_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(Inbound::GetTrackInfo(request)) => self.get_track_info(request).await,
            Ok(Inbound::Registered) => {
                tracing::info!("Registered with playback engine");
            }
            Ok(Inbound::Welcome { version }) => {
                tracing::info!(?version, "Playback engine welcome");
            }
            Ok(Inbound::UnknownCommand {
                command,
                track_id,
                request_id,
            }) => {
                tracing::warn!(command = %command, "Unknown command from playback engine");
                self.send_error(track_id, &format!("Unknown command: {command}"), request_id);
            }
            Ok(Inbound::Unrecognized { kind }) => {
                tracing::debug!(?kind, "Ignoring unrecognized message");
            }
            Err(ParseError::InvalidRequest {
                command,
                track_id,
                request_id,
                reason,
            }) => {
                tracing::warn!(command, reason = %reason, "Invalid request from playback engine");
                self.send_error(track_id, ERR_INVALID_REQUEST, request_id);
            }
            Err(e @ ParseError::Json(_)) => {
                tracing::warn!(error = %e, raw_message = %text, "Failed to parse playback engine message");
                self.send_error(None, ERR_INVALID_REQUEST, None);
            }
        }
    }

    /// Answer `getTrackInfo`.
    ///
    /// Unanalysed tracks get a high-priority job and an "in progress" error;
    /// a later completion pushes the real reply. Missing stems get a
    /// normal-priority job while the known track info is sent right away.
    pub async fn get_track_info(&self, request: GetTrackInfo) {
        let GetTrackInfo {
            track_id,
            stems: wants_stems,
            request_id,
        } = request;

        let Some(track) = self.resolve_track(track_id, request_id.clone()).await else {
            return;
        };

        if !tokio::fs::try_exists(&track.file_path).await.unwrap_or(false) {
            tracing::warn!(track_id, file_path = %track.file_path, "Track file not accessible");
            self.send_error(Some(track_id), ERR_FILE_NOT_ACCESSIBLE, request_id);
            return;
        }

        if !track.has_analysis() {
            let callback = CallbackMetadata::new(PURPOSE_TRACK_INFO, track_id, request_id.clone());
            let queued = self
                .queue(&track, StageFlags::track_info(), JobPriority::High, callback)
                .await;
            let error = if queued { ERR_ANALYSIS_IN_PROGRESS } else { ERR_QUEUE_FAILED };
            self.send_error(Some(track_id), error, request_id);
            return;
        }

        let stems_path = self.cached_stems_path(&track).await;
        if wants_stems && stems_path.is_none() {
            let callback = CallbackMetadata::new(PURPOSE_STEMS, track_id, request_id.clone());
            self.queue(&track, StageFlags::stems_only(), JobPriority::Normal, callback)
                .await;
        }

        self.send(&track_info_reply(&track, request_id, stems_path));
    }

    /// Push a success reply for a track whose analysis has completed.
    pub async fn send_track_info(&self, track_id: DbId, request_id: Option<String>) {
        let Some(track) = self.resolve_track(track_id, request_id.clone()).await else {
            return;
        };
        let stems_path = self.cached_stems_path(&track).await;
        self.send(&track_info_reply(&track, request_id, stems_path));
    }

    /// Push the location of freshly separated stems.
    pub fn send_stems_ready(&self, track_id: DbId, stems_path: String, request_id: Option<String>) -> bool {
        tracing::info!(track_id, stems_path = %stems_path, "Stems ready");
        self.send(&StemsReady::new(track_id, stems_path, request_id))
    }

    // ---- private helpers ----

    /// Look the track up, answering the request with an error if that fails.
    async fn resolve_track(&self, track_id: DbId, request_id: Option<String>) -> Option<Track> {
        match self.tracks.get(track_id).await {
            Ok(Some(track)) => Some(track),
            Ok(None) => {
                tracing::info!(track_id, "Requested track not found");
                self.send_error(Some(track_id), ERR_TRACK_NOT_FOUND, request_id);
                None
            }
            Err(e) => {
                tracing::error!(track_id, error = %e, "Track lookup failed");
                self.send_error(Some(track_id), ERR_LOOKUP_FAILED, request_id);
                None
            }
        }
    }

    async fn queue(
        &self,
        track: &Track,
        stages: StageFlags,
        priority: JobPriority,
        callback: CallbackMetadata,
    ) -> bool {
        let purpose = callback.purpose.clone();
        match self.jobs.submit(&track.file_path, stages, priority, callback).await {
            Ok(job) => {
                tracing::info!(
                    job_id = %job.id,
                    track_id = track.id,
                    purpose = %purpose,
                    priority = %priority,
                    "Queued analysis for playback request",
                );
                true
            }
            Err(e) => {
                tracing::error!(track_id = track.id, purpose = %purpose, error = %e, "Failed to queue analysis");
                false
            }
        }
    }

    /// Stems directory for `track`, if the cache holds a complete entry.
    pub(crate) async fn cached_stems_path(&self, track: &Track) -> Option<String> {
        let hash = track.content_hash.as_deref()?;
        match self.stems.get(hash).await {
            Ok(hit) => hit.map(|stems| stems.dir.to_string_lossy().into_owned()),
            Err(e) => {
                tracing::warn!(track_id = track.id, content_hash = hash, error = %e, "Stem cache lookup failed");
                None
            }
        }
    }
}

fn track_info_reply(track: &Track, request_id: Option<String>, stems_path: Option<String>) -> TrackInfoReply {
    TrackInfoReply {
        success: true,
        request_id,
        track_id: track.id,
        file_path: track.file_path.clone(),
        bpm: track.bpm,
        key: track.musical_key.clone(),
        mode: track.mode.clone(),
        beats: timing_or_empty(track.id, "beats", track.beats.as_deref()),
        downbeats: timing_or_empty(track.id, "downbeats", track.downbeats.as_deref()),
        stems_path,
    }
}

/// A corrupt timing blob degrades to an empty sequence.
fn timing_or_empty(track_id: DbId, field: &str, raw: Option<&str>) -> Vec<f64> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    parse_timing(raw).unwrap_or_else(|e| {
        tracing::warn!(track_id, field, error = %e, "Corrupt timing data, sending empty sequence");
        Vec::new()
    })
}
