//! Analysis stage definitions and progress arithmetic.
//!
//! A job requests a set of stages via [`StageFlags`]. Workers report each
//! finished stage by name; the registry turns the completed set into a
//! percentage with [`progress_percent`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stage names
// ---------------------------------------------------------------------------

/// Tempo (BPM) detection.
pub const STAGE_TEMPO: &str = "tempo";

/// Musical key and mode detection.
pub const STAGE_KEY: &str = "key";

/// Beat and downbeat grid extraction.
pub const STAGE_BEATS: &str = "beats";

/// Source separation into stems.
pub const STAGE_STEMS: &str = "stems";

/// Waveform overview rendering.
pub const STAGE_WAVEFORM: &str = "waveform";

// ---------------------------------------------------------------------------
// StageFlags
// ---------------------------------------------------------------------------

/// The analysis stages requested for a job.
///
/// Serialized as a flat object of booleans, e.g.
/// `{"tempo":true,"key":true,"beats":true,"stems":false,"waveform":false}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageFlags {
    pub tempo: bool,
    pub key: bool,
    pub beats: bool,
    pub stems: bool,
    pub waveform: bool,
}

impl StageFlags {
    /// Tempo, key and beat grid: everything a playback deck needs to sync.
    pub fn track_info() -> Self {
        Self {
            tempo: true,
            key: true,
            beats: true,
            ..Self::default()
        }
    }

    /// Stem separation only.
    pub fn stems_only() -> Self {
        Self {
            stems: true,
            ..Self::default()
        }
    }

    /// Names of the requested stages, in a stable order.
    pub fn requested(&self) -> Vec<&'static str> {
        [
            (self.tempo, STAGE_TEMPO),
            (self.key, STAGE_KEY),
            (self.beats, STAGE_BEATS),
            (self.stems, STAGE_STEMS),
            (self.waveform, STAGE_WAVEFORM),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    /// Number of requested stages.
    pub fn total(&self) -> i64 {
        self.requested().len() as i64
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Percentage of requested stages that have completed, rounded and
/// clamped to `0..=100`. A job with no requested stages reports 0.
pub fn progress_percent(completed: usize, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    (pct as i64).clamp(0, 100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
