//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&DbPool` as the first argument.

pub mod analysis_job_repo;
pub mod track_repo;

pub use analysis_job_repo::{AnalysisJobRepo, RowUpdate};
pub use track_repo::TrackRepo;
