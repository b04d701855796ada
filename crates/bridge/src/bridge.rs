//! Connection lifecycle of the bridge.
//!
//! A [`Bridge`] owns at most one live session with the playback engine. A
//! session is three tasks: a reader dispatching inbound frames, a writer
//! draining the outbound channel into the socket, and a keepalive ticker
//! feeding ping frames into that same channel. When the reader sees the
//! connection end, the bridge either stays down (the close was requested via
//! [`Bridge::disconnect`]) or schedules a reconnect on the backoff timer.
//!
//! All mutable state sits in one `std::sync::Mutex` that is only held for
//! short, non-async sections.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use deckd_core::types::DbId;
use deckd_registry::JobSubmitter;
use deckd_stems::StemCache;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::client::{self, WsStream};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::lookup::TrackLookup;
use crate::messages::{ErrorReply, Identify};
use crate::reconnect::Backoff;

/// Observable connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A reconnect attempt will fire after `delay`.
    ReconnectScheduled { delay: Duration },
}

struct BridgeState {
    phase: ConnectionState,
    backoff: Backoff,
    /// Single-flight guard for `connect`.
    connecting: bool,
    /// Set by `disconnect`; suppresses reconnects until the next `connect`.
    self_closed: bool,
    /// Incremented per session so a late close from an old session is
    /// ignored.
    session: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// Client side of the playback engine connection.
///
/// Construct once, wrap in `Arc`, call [`connect`](Self::connect) and spawn
/// [`run_notifications`](Self::run_notifications).
pub struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) tracks: Arc<dyn TrackLookup>,
    pub(crate) jobs: Arc<dyn JobSubmitter>,
    pub(crate) stems: Arc<StemCache>,
    peer_ready: watch::Receiver<bool>,
    state: Mutex<BridgeState>,
}

impl Bridge {
    /// `peer_ready` flips to `true` once the playback engine process is up.
    pub fn new(
        config: BridgeConfig,
        tracks: Arc<dyn TrackLookup>,
        jobs: Arc<dyn JobSubmitter>,
        stems: Arc<StemCache>,
        peer_ready: watch::Receiver<bool>,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            config,
            tracks,
            jobs,
            stems,
            peer_ready,
            state: Mutex::new(BridgeState {
                phase: ConnectionState::Disconnected,
                backoff,
                connecting: false,
                self_closed: false,
                session: 0,
                outbound: None,
                keepalive: None,
                reconnect: None,
                writer: None,
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock_state().phase
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().outbound.is_some()
    }

    /// Open the connection.
    ///
    /// Returns immediately if a connection is open or an attempt is already
    /// in flight. Otherwise waits (bounded) for the peer to report ready,
    /// dials, and on success sends the `identify` handshake and starts the
    /// keepalive. A failed dial schedules a reconnect before returning the
    /// error.
    pub async fn connect(self: &Arc<Self>) -> Result<(), BridgeError> {
        {
            let mut state = self.lock_state();
            if state.connecting || state.outbound.is_some() {
                tracing::debug!(phase = ?state.phase, "Connect skipped, already connected or connecting");
                return Ok(());
            }
            state.connecting = true;
            state.self_closed = false;
            state.phase = ConnectionState::Connecting;
            if let Some(pending) = state.reconnect.take() {
                pending.abort();
            }
        }

        self.wait_for_peer().await;

        tracing::info!(url = %self.config.url, "Connecting to playback engine");
        match client::dial(&self.config.url, self.config.connect_timeout).await {
            Ok(ws_stream) => {
                self.start_session(ws_stream);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %self.config.url, error = %e, "Playback engine connect failed");
                {
                    let mut state = self.lock_state();
                    state.connecting = false;
                    state.phase = ConnectionState::Disconnected;
                }
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Close the connection with a normal-closure frame and disable
    /// reconnection until the next explicit [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let writer = {
            let mut state = self.lock_state();
            state.self_closed = true;
            state.phase = ConnectionState::Disconnected;
            if let Some(task) = state.reconnect.take() {
                task.abort();
            }
            if let Some(task) = state.keepalive.take() {
                task.abort();
            }
            if let Some(tx) = state.outbound.take() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "shutdown".into(),
                };
                let _ = tx.send(Message::Close(Some(frame)));
            }
            state.writer.take()
        };

        // Let the writer flush the close frame.
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        tracing::info!("Disconnected from playback engine");
    }

    /// Queue a JSON message. A no-op (logged) while no connection is open.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound message");
                return false;
            }
        };

        let Some(tx) = self.lock_state().outbound.clone() else {
            tracing::warn!("Playback engine not connected, dropping message");
            return false;
        };
        tracing::trace!(message = %text, "Sending to playback engine");
        tx.send(Message::Text(text)).is_ok()
    }

    /// Send a structured `{success: false}` reply.
    pub fn send_error(
        &self,
        track_id: Option<DbId>,
        error: &str,
        request_id: Option<String>,
    ) -> bool {
        tracing::debug!(?track_id, error, "Sending error reply");
        self.send(&ErrorReply::new(track_id, error, request_id))
    }

    // ---- session lifecycle ----

    async fn wait_for_peer(&self) {
        let mut ready = self.peer_ready.clone();
        let budget = self.config.peer_ready_timeout;
        let outcome = tokio::time::timeout(budget, ready.wait_for(|up| *up))
            .await
            .map(|res| res.is_ok());
        match outcome {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Peer readiness signal dropped, dialing anyway");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = budget.as_secs(),
                    "Playback engine not ready in time, dialing anyway",
                );
            }
        }
    }

    fn start_session(self: &Arc<Self>, ws_stream: WsStream) {
        let (mut sink, stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let mut state = self.lock_state();
        state.connecting = false;
        if state.self_closed {
            // Disconnected while the dial was in flight.
            state.phase = ConnectionState::Disconnected;
            drop(state);
            tokio::spawn(async move {
                let _ = sink.close().await;
            });
            return;
        }

        state.session += 1;
        let session = state.session;
        state.backoff.reset();
        state.phase = ConnectionState::Connected;

        state.writer = Some(tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!(error = %e, "Playback engine sink closed");
                    break;
                }
                if closing {
                    break;
                }
            }
        }));
        state.keepalive = Some(spawn_keepalive(tx.clone(), self.config.keepalive_interval));
        state.outbound = Some(tx);
        drop(state);

        let reader = Arc::clone(self);
        tokio::spawn(async move { reader.read_loop(stream, session).await });

        self.send(&Identify::new(&self.config.role));
    }

    async fn read_loop(self: Arc<Self>, mut stream: SplitStream<WsStream>, session: u64) {
        while let Some(msg_result) = stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    self.handle_text(&text).await;
                }
                Ok(Message::Pong(_)) => {
                    tracing::trace!("Keepalive pong received");
                }
                Ok(Message::Ping(_)) => {
                    // Answered automatically by tungstenite.
                }
                Ok(Message::Binary(_)) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Playback engine closed the connection");
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Playback engine receive error");
                    break;
                }
            }
        }
        self.on_closed(session);
    }

    fn on_closed(self: &Arc<Self>, session: u64) {
        let mut state = self.lock_state();
        if state.session != session {
            return;
        }
        state.outbound = None;
        if let Some(task) = state.keepalive.take() {
            task.abort();
        }
        if let Some(task) = state.writer.take() {
            task.abort();
        }

        if state.self_closed {
            state.phase = ConnectionState::Disconnected;
            return;
        }
        state.phase = ConnectionState::Disconnected;
        drop(state);

        tracing::warn!("Playback engine connection lost");
        self.schedule_reconnect();
    }

    /// Arm the reconnect timer with the current backoff delay. Does nothing
    /// after `disconnect` or when a timer is already armed.
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if state.self_closed || state.reconnect.is_some() {
            return;
        }
        let delay = state.backoff.next_delay();
        state.phase = ConnectionState::ReconnectScheduled { delay };

        let bridge = Arc::clone(self);
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bridge.lock_state().reconnect = None;
            if let Err(e) = bridge.connect().await {
                tracing::debug!(error = %e, "Reconnect attempt failed");
            }
        }));
        drop(state);

        tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an outbound channel without a socket.
    #[cfg(test)]
    pub(crate) fn attach_outbound(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock_state();
        state.outbound = Some(tx);
        state.phase = ConnectionState::Connected;
        rx
    }
}

/// Ping on every `period`, first tick one period after start.
fn spawn_keepalive(tx: mpsc::UnboundedSender<Message>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if tx.send(Message::Ping(Vec::new())).is_err() {
                break;
            }
            tracing::trace!("Keepalive ping sent");
        }
    })
}
