//! In-memory snapshot backend for testing.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};

/// An in-memory snapshot backend.
///
/// Holds the snapshot in a `Vec<u8>` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use driftsync_store::{MemoryBackend, SnapshotBackend};
///
/// let mut backend = MemoryBackend::new();
/// backend.persist(b"snapshot").unwrap();
/// assert_eq!(backend.load().unwrap(), Some(b"snapshot".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: Option<Vec<u8>>,
    fail_persist: bool,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with snapshot bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_snapshot(snapshot: Vec<u8>) -> Self {
        Self {
            snapshot: Some(snapshot),
            fail_persist: false,
        }
    }

    /// Makes every subsequent `persist` fail with an I/O error.
    ///
    /// Lets tests exercise the store's rollback path.
    pub fn fail_persists(&mut self, fail: bool) {
        self.fail_persist = fail;
    }

    /// Returns a copy of the current snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.clone()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&mut self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.clone())
    }

    fn persist(&mut self, snapshot: &[u8]) -> StoreResult<()> {
        if self.fail_persist {
            return Err(StoreError::Io(std::io::Error::other(
                "persist failure injected",
            )));
        }
        self.snapshot = Some(snapshot.to_vec());
        Ok(())
    }
}
