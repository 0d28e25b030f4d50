use novella_shared::EntityKind;
use novella_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The on-device table for this entity kind could not be parsed. Reads
    /// and writes of that kind fail until the table is cleared.
    #[error("Local {table} table is corrupt: {reason}")]
    LocalCorruption { table: &'static str, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("No signed-in user")]
    NoIdentity,

    #[error("Local store error: {0}")]
    Store(StoreError),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { table, reason } => SyncError::LocalCorruption { table, reason },
            other => SyncError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
