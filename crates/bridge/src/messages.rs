//! Wire messages exchanged with the playback engine.
//!
//! Requests carry a `command` field; handshake traffic from the engine
//! carries a `type` field instead. Everything the bridge sends is built from
//! the serializable structs below.

use deckd_core::types::DbId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CMD_GET_TRACK_INFO: &str = "getTrackInfo";

pub const ERR_ANALYSIS_IN_PROGRESS: &str = "Analysis in progress";
pub const ERR_TRACK_NOT_FOUND: &str = "Track not found";
pub const ERR_FILE_NOT_ACCESSIBLE: &str = "Track file not accessible";
pub const ERR_QUEUE_FAILED: &str = "Failed to queue analysis";
pub const ERR_LOOKUP_FAILED: &str = "Track lookup failed";
pub const ERR_INVALID_REQUEST: &str = "Invalid request";

/// Body of a `getTrackInfo` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTrackInfo {
    pub track_id: DbId,
    #[serde(default)]
    pub stems: bool,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    GetTrackInfo(GetTrackInfo),
    /// `{type: "registered"}` handshake acknowledgement.
    Registered,
    /// `{type: "welcome", version}` greeting.
    Welcome { version: Option<String> },
    /// A `command` the bridge does not implement.
    UnknownCommand {
        command: String,
        track_id: Option<DbId>,
        request_id: Option<String>,
    },
    /// Neither a command nor a known handshake type.
    Unrecognized { kind: Option<String> },
}

/// Why an inbound frame could not be turned into [`Inbound`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {command} request: {reason}")]
    InvalidRequest {
        command: &'static str,
        track_id: Option<DbId>,
        request_id: Option<String>,
        reason: String,
    },
}

/// Parse a text frame from the playback engine.
pub fn parse_inbound(text: &str) -> Result<Inbound, ParseError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(command) = value.get("command").and_then(Value::as_str) {
        if command == CMD_GET_TRACK_INFO {
            return serde_json::from_value::<GetTrackInfo>(value.clone())
                .map(Inbound::GetTrackInfo)
                .map_err(|e| ParseError::InvalidRequest {
                    command: CMD_GET_TRACK_INFO,
                    track_id: track_id_of(&value),
                    request_id: request_id_of(&value),
                    reason: e.to_string(),
                });
        }
        return Ok(Inbound::UnknownCommand {
            command: command.to_string(),
            track_id: track_id_of(&value),
            request_id: request_id_of(&value),
        });
    }

    Ok(match value.get("type").and_then(Value::as_str) {
        Some("registered") => Inbound::Registered,
        Some("welcome") => Inbound::Welcome {
            version: value.get("version").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        },
        other => Inbound::Unrecognized {
            kind: other.map(str::to_string),
        },
    })
}

fn track_id_of(value: &Value) -> Option<DbId> {
    value.get("trackId").and_then(Value::as_i64)
}

fn request_id_of(value: &Value) -> Option<String> {
    value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Handshake sent right after the connection opens.
#[derive(Debug, Clone, Serialize)]
pub struct Identify {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: String,
}

impl Identify {
    pub fn new(role: &str) -> Self {
        Self {
            kind: "identify",
            role: role.to_string(),
        }
    }
}

/// Successful `getTrackInfo` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfoReply {
    pub success: bool,
    pub request_id: Option<String>,
    pub track_id: DbId,
    pub file_path: String,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub mode: Option<String>,
    pub beats: Vec<f64>,
    pub downbeats: Vec<f64>,
    /// `null` until stems have been separated.
    pub stems_path: Option<String>,
}

/// Structured failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub success: bool,
    pub track_id: Option<DbId>,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorReply {
    pub fn new(track_id: Option<DbId>, error: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            success: false,
            track_id,
            error: error.into(),
            request_id,
        }
    }
}

/// Asynchronous push once stems for a track are on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StemsReady {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub success: bool,
    pub track_id: DbId,
    pub stems_path: String,
    pub request_id: Option<String>,
}

impl StemsReady {
    pub fn new(track_id: DbId, stems_path: String, request_id: Option<String>) -> Self {
        Self {
            kind: "stemsReady",
            success: true,
            track_id,
            stems_path,
            request_id,
        }
    }
}
