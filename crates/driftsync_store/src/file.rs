//! File-based snapshot backend for persistent storage.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const LOCK_SUFFIX: &str = "lock";
const TMP_SUFFIX: &str = "tmp";

/// A file-based snapshot backend.
///
/// The snapshot survives process restarts. Writes go to a sibling
/// temporary file which is fsynced and renamed over the snapshot, so a
/// crash mid-write leaves the previous snapshot intact.
///
/// # Locking
///
/// An exclusive advisory lock on a sibling `.lock` file guards against a
/// second process opening the same store. The lock is held for the
/// lifetime of the backend.
///
/// # Example
///
/// ```no_run
/// use driftsync_store::{FileBackend, SnapshotBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("notes.driftsync")).unwrap();
/// backend.persist(b"snapshot bytes").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Held for its advisory lock; never read or written.
    _lock_file: File,
}

impl FileBackend {
    /// Opens a snapshot file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unsupported`] if the path cannot be prepared on
    ///   this platform (fatal at initialization)
    /// - [`StoreError::Locked`] if another process holds the store
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unsupported(format!(
                        "cannot create store directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let lock_path = path.with_extension(LOCK_SUFFIX);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                StoreError::Unsupported(format!(
                    "cannot open lock file {}: {e}",
                    lock_path.display()
                ))
            })?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for FileBackend {
    fn load(&mut self) -> StoreResult<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    fn persist(&mut self, snapshot: &[u8]) -> StoreResult<()> {
        let tmp_path = self.path.with_extension(TMP_SUFFIX);

        let result = (|| -> std::io::Result<()> {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(snapshot)?;
            tmp.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            // Make the rename itself durable.
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Ok(dir) = File::open(parent) {
                        let _ = dir.sync_all();
                    }
                }
            }
            Ok(())
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            match e.kind() {
                ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StoreError::QuotaExceeded {
                    snapshot_bytes: snapshot.len(),
                },
                _ => StoreError::Io(e),
            }
        })
    }
}
