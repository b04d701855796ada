use std::time::Duration;

/// Errors surfaced by the bridge.
///
/// Transport failures never reach callers of `send`; they only show up as
/// the result of an explicit `connect`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The dial did not complete within the per-attempt budget.
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// Track lookup against the store failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
