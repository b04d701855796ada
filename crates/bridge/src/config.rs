use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Role announced in the `identify` handshake.
pub const DEFAULT_ROLE: &str = "appServer";

/// Tunables for [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WebSocket URL of the playback engine, e.g. `ws://127.0.0.1:9002`.
    pub url: String,
    pub role: String,
    /// How long `connect` waits for the peer readiness flag before dialing
    /// anyway.
    pub peer_ready_timeout: Duration,
    /// Budget for a single dial attempt.
    pub connect_timeout: Duration,
    /// Ping period. Must stay well under the peer's idle timeout.
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9002".to_string(),
            role: DEFAULT_ROLE.to_string(),
            peer_ready_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}
