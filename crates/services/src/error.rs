//! Shared error types for the services crate.

use thiserror::Error;

use storage::store::StorageError;

/// Errors emitted by the remote sync client and remote store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("remote request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the progress, resume, stats and results services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors emitted by the profile service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<ProgressError> for ProfileError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::Storage(e) => ProfileError::Storage(e),
            ProgressError::Serialization(e) => ProfileError::Serialization(e),
            ProgressError::Sync(e) => ProfileError::Sync(e),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] storage::sqlite::SqliteInitError),
}
