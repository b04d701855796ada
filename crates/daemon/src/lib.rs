//! Wiring for the `deckd` daemon: environment configuration and the
//! background housekeeping tasks that run next to the bridge.

pub mod config;
pub mod purge;
