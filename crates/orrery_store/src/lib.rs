//! # Orrery Store
//!
//! Durable offline store for chart documents.
//!
//! This crate provides:
//! - A transactional key-indexed store holding two collections: cached
//!   [`ChartRecord`]s and a queue of [`QueuedMutation`]s awaiting remote
//!   application
//! - A capacity-bounded eviction policy (priority + recency ranking)
//! - Snapshot persistence through a pluggable [`SnapshotBackend`]
//!
//! ## Architecture
//!
//! The store keeps both collections in memory behind a single lock and writes
//! them out as one CBOR snapshot after every mutation. Backends are opaque
//! snapshot holders; the store owns all format interpretation.
//!
//! ## Key Invariants
//!
//! - Record ids are unique within the store
//! - Records with `synced == false` are never evicted
//! - The mutation queue preserves enqueue order
//! - Retrieved values are clones, never live references into the store

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod clock;
mod error;
pub mod eviction;
mod file;
mod memory;
mod mutation;
mod record;
mod store;

pub use backend::SnapshotBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use eviction::EvictionLimits;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use mutation::{MutationAction, QueuedMutation};
pub use record::{ChartRecord, Priority};
pub use store::ChartStore;
