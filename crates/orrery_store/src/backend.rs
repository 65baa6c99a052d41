//! Snapshot backend trait definition.

use crate::error::StoreResult;

/// A durable holder for the store's serialized snapshot.
///
/// Backends are **opaque byte stores**. The store encodes both collections
/// into a single snapshot and hands it to the backend; backends do not
/// understand records, queue entries, or the snapshot format.
///
/// # Invariants
///
/// - `load` returns exactly the bytes most recently passed to `persist`,
///   or `None` if nothing was ever persisted
/// - `persist` replaces the previous snapshot atomically: a crash mid-write
///   must leave either the old snapshot or the new one, never a torn mix
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`crate::MemoryBackend`] - For testing
/// - [`crate::FileBackend`] - For persistent storage
pub trait SnapshotBackend: Send + Sync {
    /// Loads the most recently persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replaces the persisted snapshot.
    ///
    /// After this returns successfully, the snapshot survives process
    /// termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written durably.
    fn persist(&self, snapshot: &[u8]) -> StoreResult<()>;
}

impl<B: SnapshotBackend + ?Sized> SnapshotBackend for std::sync::Arc<B> {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        (**self).persist(snapshot)
    }
}

impl<B: SnapshotBackend + ?Sized> SnapshotBackend for Box<B> {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        (**self).persist(snapshot)
    }
}
