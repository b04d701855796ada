use std::path::PathBuf;

use deckd_core::error::CoreError;

/// Errors from stem cache operations.
///
/// Partial or corrupt entries are not errors; they are healed and reported
/// as misses.
#[derive(Debug, thiserror::Error)]
pub enum StemCacheError {
    /// A content hash or asset type failed validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// A source asset handed to `set` does not exist.
    #[error("Source asset {asset_type} not found at {}", path.display())]
    SourceMissing { asset_type: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),
}
