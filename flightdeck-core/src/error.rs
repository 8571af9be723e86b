//! Error types for flightdeck-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{PhaseId, ProjectId};

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure (locked database, constraint violation, etc.).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O failure while preparing the database location.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding of an audit payload failed.
    #[error("audit payload JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value did not parse back into its domain enum.
    #[error("corrupt row: {column} held unexpected value '{value}'")]
    CorruptRow { column: &'static str, value: String },

    #[error("phase {0} not found")]
    PhaseNotFound(PhaseId),

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.flightdeck/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
