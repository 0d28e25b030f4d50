use thiserror::Error;

/// Failures of the on-device cache.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The platform reported no per-user data directory.
    #[error("No application data directory for the cache")]
    NoDataDir,

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache schema upgrade failed: {0}")]
    Migration(String),

    /// A persisted table could not be parsed. The cache for that table can
    /// no longer be trusted until it is cleared.
    #[error("Local table '{table}' is corrupt: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// Failed to serialize a table before writing it.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
