//! deckd job event bus.
//!
//! The job registry publishes a [`JobEvent`] for every state change; the
//! protocol bridge subscribes to learn when work it triggered has finished.
//! Publishing is fire-and-forget so the registry never depends on who is
//! listening.

pub mod bus;

pub use bus::{EventBus, JobEvent, JobEventKind};
