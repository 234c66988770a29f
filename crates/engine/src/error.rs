use quorum_core::CoreError;
use quorum_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("data has changed: expected {field} to be {expected}, but was {actual}")]
    PrerequisiteMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("invalid edit: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Coarse classification for callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    StateConflict,
    PrerequisiteMismatch,
    Validation,
    NotFound,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::PrerequisiteMismatch { .. } => ErrorKind::PrerequisiteMismatch,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::Storage(_) | Self::Core(_) => ErrorKind::Internal,
        }
    }
}

pub(crate) const UPDATE_LIMIT_REACHED: &str = "edit update limit reached";
