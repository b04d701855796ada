/// Library track primary keys are SQLite INTEGER rowids.
pub type DbId = i64;

/// Analysis job identifiers are opaque, caller-chosen strings.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
