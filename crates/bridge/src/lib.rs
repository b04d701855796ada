//! WebSocket bridge between the library store and the playback engine.
//!
//! The [`Bridge`] keeps one client connection to the playback engine alive
//! (readiness wait, handshake, keepalive pings, exponential-backoff
//! reconnect), answers `getTrackInfo` requests from the store and the
//! stem cache, queues analysis jobs for whatever is missing, and pushes
//! follow-up replies when those jobs complete.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod lookup;
pub mod messages;
pub mod notify;
pub mod reconnect;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, ConnectionState};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use lookup::{DbTrackLookup, TrackLookup};
pub use reconnect::{Backoff, ReconnectConfig};
