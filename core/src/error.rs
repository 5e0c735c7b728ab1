use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the organizer core.
///
/// Per-item failures during a run never appear here; they are recorded as
/// [`crate::ItemOutcome::Failed`] and reported through the run summary.
#[derive(Debug, Error)]
pub enum OrganizerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("folder not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl OrganizerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrganizerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, OrganizerError::Validation(_))
    }
}

impl From<serde_json::Error> for OrganizerError {
    fn from(error: serde_json::Error) -> Self {
        OrganizerError::Serialization(error.to_string())
    }
}

pub type Result<T, E = OrganizerError> = std::result::Result<T, E>;
