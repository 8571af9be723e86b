//! Error types for flightdeck-sync.

use thiserror::Error;

use flightdeck_codec::CodecError;
use flightdeck_core::StoreError;

/// All errors that can surface from the engine's public operations.
///
/// Errors inside the reactive watch pipeline never reach callers; they are
/// logged and absorbed so the watch loop keeps running.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("no unresolved conflict with id {0}")]
    ConflictNotFound(u64),

    #[error("conflict {id} carries unusable {field} value '{value}'")]
    UnusableConflictValue {
        id: u64,
        field: String,
        value: String,
    },

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
