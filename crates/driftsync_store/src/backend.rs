//! Snapshot backend trait definition.

use crate::error::StoreResult;

/// A durable home for the store's serialized snapshot.
///
/// Backends are **opaque byte stores**: they hold exactly one snapshot
/// blob and replace it atomically. The store owns the snapshot format;
/// backends do not interpret the bytes they hold.
///
/// # Invariants
///
/// - `persist` replaces the previous snapshot atomically: a crash during
///   `persist` leaves either the old or the new snapshot, never a mix
/// - `load` returns exactly the bytes of the last successful `persist`,
///   or `None` if nothing was ever persisted
/// - Backends must be `Send` so the store can own them behind a lock
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - for tests and ephemeral stores
/// - [`super::FileBackend`] - for persistent storage with an advisory lock
pub trait SnapshotBackend: Send {
    /// Loads the last persisted snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    fn load(&mut self) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replaces the snapshot with the given bytes.
    ///
    /// After this returns successfully, the snapshot survives process
    /// termination (for durable backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; quota exhaustion is reported
    /// as [`crate::StoreError::QuotaExceeded`].
    fn persist(&mut self, snapshot: &[u8]) -> StoreResult<()>;
}
