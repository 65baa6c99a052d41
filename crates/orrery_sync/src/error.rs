//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] orrery_store::StoreError),

    /// The remote endpoint failed.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// No network is available.
    #[error("offline")]
    Offline,
}

impl SyncError {
    /// Returns true if this error can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::Offline => true,
            SyncError::Store(_) => false,
        }
    }
}

impl From<crate::remote::RemoteError> for SyncError {
    fn from(err: crate::remote::RemoteError) -> Self {
        let retryable = err.is_retryable();
        SyncError::Remote {
            message: err.to_string(),
            retryable,
        }
    }
}
