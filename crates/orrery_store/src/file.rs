//! File-based snapshot backend for persistent storage.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based snapshot backend.
///
/// The snapshot survives process restarts. Writes go to a sibling temp file
/// which is fsynced and renamed over the target, so a crash mid-write leaves
/// either the previous snapshot or the new one intact.
///
/// # Locking
///
/// Opening takes an exclusive advisory lock on a `.lock` sibling file; a
/// second process opening the same path gets [`StoreError::Locked`]. The lock
/// is released when the backend is dropped.
///
/// # Thread Safety
///
/// This backend is thread-safe; writers are serialized internally.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Held for its advisory lock; released on drop.
    _lock_file: File,
    write_gate: Mutex<()>,
}

impl FileBackend {
    /// Opens a snapshot backend at the given path.
    ///
    /// The snapshot file itself is not created until the first `persist`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the lock, or
    /// an I/O error if the lock file cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let lock_path = sibling(path, ".lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            write_gate: Mutex::new(()),
        })
    }

    /// Opens a snapshot backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the lock cannot
    /// be taken.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        let _guard = self.write_gate.lock();

        let tmp_path = sibling(&self.path, ".tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(snapshot)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
