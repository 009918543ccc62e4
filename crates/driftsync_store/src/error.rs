//! Error types for the local durable store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the local durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred while persisting or loading the snapshot.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage quota is exhausted.
    ///
    /// Raised either by the store's own snapshot size limit or by the
    /// backing filesystem reporting no space.
    #[error("storage quota exceeded: snapshot of {snapshot_bytes} bytes over limit")]
    QuotaExceeded {
        /// Size of the snapshot that could not be persisted.
        snapshot_bytes: usize,
    },

    /// The persisted snapshot could not be decoded.
    #[error("store snapshot corrupted: {0}")]
    Corrupted(String),

    /// The durable storage engine is unavailable on this platform.
    ///
    /// Fatal at initialization; the store cannot be opened.
    #[error("storage engine unavailable: {0}")]
    Unsupported(String),

    /// Another process holds the store file.
    #[error("store file is locked by another process: {0}")]
    Locked(String),

    /// A queue operation referenced an id that no longer exists.
    #[error("operation {0} not found in sync queue")]
    OpNotFound(u64),
}

impl StoreError {
    /// Wraps a serialization failure as corruption.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
