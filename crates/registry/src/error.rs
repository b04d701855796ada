use deckd_db::models::status::JobStatus;

/// Errors returned by [`JobRegistry`](crate::JobRegistry) operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No job with the given id exists.
    #[error("Analysis job not found: {0}")]
    NotFound(String),

    /// The job is already in a terminal status and cannot change again.
    #[error("Job {id} is {from} and cannot move to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: &'static str,
    },

    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
