//! # Orrery Sync
//!
//! Connectivity-aware synchronization for the Orrery offline store.
//!
//! This crate provides:
//! - Connectivity state machine (online/offline with a coarse quality tag)
//! - The sync manager: queue draining with retry, exponential backoff, and
//!   per-item attempt accounting
//! - A periodic background scheduler
//! - The remote endpoint abstraction and a scripted mock
//! - [`OfflineClient`], the narrow facade consumed by the presentation layer
//!
//! ## Architecture
//!
//! The store ([`orrery_store::ChartStore`]) owns all persisted state; the
//! sync manager holds only transient scheduling state and re-reads the queue
//! before every drain cycle, so a restart mid-sync is always safe.
//!
//! ## Key Invariants
//!
//! - At most one drain runs at a time; concurrent requests are skipped
//! - Mutations for the same record are applied in enqueue order
//! - One item's failure never aborts the rest of the batch
//! - An item that exhausts its attempt budget is removed permanently

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connectivity;
mod error;
mod manager;
mod remote;
mod scheduler;

pub use client::{OfflineClient, OfflineClientBuilder, SaveOptions};
pub use config::{BackoffConfig, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor, LinkQuality};
pub use error::{SyncError, SyncResult};
pub use manager::{
    DrainOutcome, DrainSummary, SkipReason, SyncManager, SyncObserver, SyncStatus,
    TerminalFailure,
};
pub use remote::{MockRemote, RemoteAck, RemoteCall, RemoteEndpoint, RemoteError};
pub use scheduler::SyncScheduler;
