//! Error types for flightdeck-codec.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from reading or rewriting plan files.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Front matter did not parse as a YAML mapping.
    #[error("malformed front matter in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An opening `---` fence with no closing fence.
    #[error("unterminated front matter fence in {path}")]
    Unterminated { path: PathBuf },

    /// YAML re-serialization failed while rewriting front matter.
    #[error("front matter serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CodecError {
    CodecError::Io {
        path: path.into(),
        source,
    }
}
