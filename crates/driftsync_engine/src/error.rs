//! Error types for the sync engine and facade.

use driftsync_protocol::{ConflictError, PatchError};
use driftsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while queueing, syncing, or using the facade.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Durable-store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A sync drain is already in progress.
    #[error("sync already in progress")]
    SyncInProgress,

    /// A conflict was detected with no resolution path available.
    #[error("unresolved conflict for note {note_id}")]
    UnresolvedConflict {
        /// The conflicted note id.
        note_id: String,
    },

    /// Conflict-resolution contract violation (bad strategy inputs).
    #[error("conflict resolution failed: {0}")]
    Resolution(#[from] ConflictError),

    /// An invalid partial update was supplied.
    #[error("invalid patch: {0}")]
    InvalidPatch(#[from] PatchError),

    /// A note or operation referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Offline mode is administratively disabled.
    #[error("offline mode is disabled")]
    OfflineDisabled,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (unexpected response shape or status).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A remote request timed out.
    #[error("request timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if another delivery attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Store(e) => matches!(e, StoreError::Io(_)),
            _ => false,
        }
    }
}
