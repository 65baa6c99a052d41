//! Error types for the offline store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying backend failed to initialize or is no longer usable.
    ///
    /// Callers are expected to treat this as non-fatal and degrade to a
    /// no-cache mode rather than propagate it to end users.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Why the store cannot be used.
        reason: String,
    },

    /// I/O error from the snapshot backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// Another process holds the store file lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A mutation referenced by id does not exist in the queue.
    #[error("mutation not found: {id}")]
    MutationNotFound {
        /// The mutation id that was not found.
        id: String,
    },
}

impl StoreError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}
