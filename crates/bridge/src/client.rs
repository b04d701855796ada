//! Dialing the playback engine.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::BridgeError;

/// The raw WebSocket stream to the playback engine.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket to `url`, giving up after `timeout`.
pub async fn dial(url: &str, timeout: Duration) -> Result<WsStream, BridgeError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((ws_stream, _response))) => {
            tracing::info!(url, "Connected to playback engine");
            Ok(ws_stream)
        }
        Ok(Err(e)) => Err(BridgeError::Connection(format!(
            "Failed to connect to {url}: {e}"
        ))),
        Err(_) => Err(BridgeError::Timeout(timeout)),
    }
}
