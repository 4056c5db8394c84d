use std::path::PathBuf;

use thiserror::Error;

use crate::core::KeyParseError;

/// Crate-level error for store operations.
///
/// Parse failures on monthly files are deliberately absent: a corrupt month
/// is tolerated as empty at read time, never surfaced as an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("state io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Key(#[from] KeyParseError),
}

impl StateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;

pub(crate) fn io_err(path: &std::path::Path, source: std::io::Error) -> StateError {
    StateError::io(path, source)
}
