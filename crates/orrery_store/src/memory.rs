//! In-memory snapshot backend for testing.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory snapshot backend.
///
/// This backend holds the snapshot in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral caches that don't need persistence
///
/// Write failures can be injected with [`MemoryBackend::set_failing`] to
/// exercise degraded-storage paths.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: RwLock<Option<Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with a snapshot.
    ///
    /// Useful for testing reopen scenarios.
    #[must_use]
    pub fn with_snapshot(snapshot: Vec<u8>) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            failing: AtomicBool::new(false),
        }
    }

    /// Returns a copy of the current snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.read().clone()
    }

    /// Makes every subsequent operation fail with
    /// [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory backend failure injected"))
        } else {
            Ok(())
        }
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.snapshot.read().clone())
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        self.check_available()?;
        *self.snapshot.write() = Some(snapshot.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_persist_then_load() {
        let backend = MemoryBackend::new();

        backend.persist(b"first").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some(&b"first"[..]));

        backend.persist(b"second").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn memory_with_snapshot() {
        let backend = MemoryBackend::with_snapshot(b"preloaded".to_vec());
        assert_eq!(backend.load().unwrap().as_deref(), Some(&b"preloaded"[..]));
    }

    #[test]
    fn memory_failure_injection() {
        let backend = MemoryBackend::new();
        backend.persist(b"data").unwrap();

        backend.set_failing(true);
        assert!(matches!(
            backend.load(),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(matches!(
            backend.persist(b"more"),
            Err(StoreError::Unavailable { .. })
        ));

        // The last good snapshot survives recovery.
        backend.set_failing(false);
        assert_eq!(backend.load().unwrap().as_deref(), Some(&b"data"[..]));
    }
}
