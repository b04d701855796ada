//! Shared domain types for the deckd workspace.
//!
//! Pure logic only: no database, filesystem or network access. The other
//! crates build on these ids, error types, analysis-stage definitions and
//! timing helpers.

pub mod analysis;
pub mod callback;
pub mod error;
pub mod timing;
pub mod types;
