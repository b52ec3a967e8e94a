//! Error types for the eligibility engine

use thiserror::Error;

/// Result type for engine operations
pub type EligibilityResult<T> = Result<T, EligibilityError>;

/// Errors surfaced by the policy store, intake and coordinator
#[derive(Error, Debug)]
pub enum EligibilityError {
    /// Malformed input, rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// A second trigger arrived while a run was active
    #[error("Eligibility run already in progress (run {0})")]
    RunAlreadyInProgress(uuid::Uuid),

    /// Snapshot or persistence failed mid-run; prior verdicts stay authoritative
    #[error("Eligibility run failed: {0}")]
    RunFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EligibilityError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EligibilityError::RunAlreadyInProgress(_) | EligibilityError::RunFailed(_)
        )
    }
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
