//! In-memory collaborators for bridge unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use deckd_core::analysis::StageFlags;
use deckd_core::callback::CallbackMetadata;
use deckd_core::types::DbId;
use deckd_db::models::job::AnalysisJob;
use deckd_db::models::status::{JobPriority, JobStatus};
use deckd_db::models::track::Track;
use deckd_registry::{JobSubmitter, RegistryError};
use deckd_stems::{NeverInUse, StemCache, StemCacheConfig};
use sqlx::types::Json;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::watch;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::lookup::TrackLookup;

#[derive(Default)]
pub struct FakeTracks {
    tracks: HashMap<DbId, Track>,
}

impl FakeTracks {
    pub fn with(track: Track) -> Self {
        Self {
            tracks: HashMap::from([(track.id, track)]),
        }
    }
}

#[async_trait]
impl TrackLookup for FakeTracks {
    async fn get(&self, id: DbId) -> Result<Option<Track>, BridgeError> {
        Ok(self.tracks.get(&id).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub file_path: String,
    pub stages: StageFlags,
    pub priority: JobPriority,
    pub callback: CallbackMetadata,
}

#[derive(Clone, Default)]
pub struct RecordingSubmitter {
    submissions: Arc<Mutex<Vec<Submission>>>,
    fail: bool,
}

impl RecordingSubmitter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobSubmitter for RecordingSubmitter {
    async fn submit(
        &self,
        file_path: &str,
        stages: StageFlags,
        priority: JobPriority,
        callback: CallbackMetadata,
    ) -> Result<AnalysisJob, RegistryError> {
        if self.fail {
            return Err(RegistryError::Database(sqlx::Error::PoolClosed));
        }
        self.submissions.lock().unwrap().push(Submission {
            file_path: file_path.to_string(),
            stages,
            priority,
            callback: callback.clone(),
        });
        let mut job = sample_job(&callback, JobStatus::Queued);
        job.file_path = file_path.to_string();
        job.priority = priority;
        job.requested_stages = Json(stages.requested().into_iter().map(str::to_string).collect());
        job.stages_total = stages.total();
        Ok(job)
    }
}

/// A job row carrying `callback`, as the registry would return it.
pub fn sample_job(callback: &CallbackMetadata, status: JobStatus) -> AnalysisJob {
    let now = Utc::now();
    AnalysisJob {
        id: callback.job_key().unwrap_or_else(|| "job".into()),
        track_id: callback.track_id,
        file_path: "/music/track.flac".into(),
        status,
        priority: JobPriority::High,
        requested_stages: Json(Vec::new()),
        completed_stages: Json(Vec::new()),
        stages_total: 0,
        progress_percent: 0,
        retry_count: 0,
        max_retries: 3,
        last_error: None,
        callback_metadata: Some(Json(callback.to_value())),
        created_at: now,
        started_at: None,
        completed_at: None,
        last_updated: now,
    }
}

/// Track backed by a real temp file, without analysis.
pub fn bare_track(id: DbId) -> (NamedTempFile, Track) {
    let file = NamedTempFile::new().unwrap();
    let track = Track {
        id,
        file_path: file.path().to_string_lossy().into_owned(),
        content_hash: Some(format!("hash{id}")),
        bpm: None,
        musical_key: None,
        mode: None,
        beats: None,
        downbeats: None,
    };
    (file, track)
}

/// Track backed by a real temp file, fully analysed.
pub fn analysed_track(id: DbId) -> (NamedTempFile, Track) {
    let (file, mut track) = bare_track(id);
    track.bpm = Some(124.0);
    track.musical_key = Some("A".into());
    track.mode = Some("minor".into());
    track.beats = Some("[0.5, 1.0, 1.5]".into());
    track.downbeats = Some("[0.5]".into());
    (file, track)
}

/// Bridge over fakes with a stem cache in a fresh temp dir.
pub fn bridge_with(tracks: FakeTracks, jobs: RecordingSubmitter) -> (Bridge, TempDir) {
    let tmp = TempDir::new().unwrap();
    let stems = StemCache::new(
        StemCacheConfig {
            root: tmp.path().to_path_buf(),
            max_entries: 10,
        },
        Arc::new(NeverInUse),
    );
    let (_tx, peer_ready) = watch::channel(true);
    let bridge = Bridge::new(
        BridgeConfig::default(),
        Arc::new(tracks),
        Arc::new(jobs),
        Arc::new(stems),
        peer_ready,
    );
    (bridge, tmp)
}
