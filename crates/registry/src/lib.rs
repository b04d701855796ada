//! Durable analysis job registry.
//!
//! [`JobRegistry`] owns every state transition of an analysis job: creation
//! (idempotent on the caller-chosen id), worker-driven status changes, stage
//! progress, and retry accounting on failure. Each change is published on
//! the [`EventBus`](deckd_events::EventBus) so that other components can
//! react without the registry knowing about them.

pub mod error;
pub mod registry;
pub mod submit;

pub use error::RegistryError;
pub use registry::{CreateJob, FailureOutcome, JobRegistry, JobStats, RegistryConfig};
pub use submit::JobSubmitter;
