//! The sync manager: drains the mutation queue against the remote authority.

use crate::config::SyncConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::error::SyncResult;
use crate::remote::{RemoteEndpoint, RemoteError};
use orrery_store::{ChartStore, Clock, MutationAction, QueuedMutation};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a drain request did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No network is available.
    Offline,
    /// Another drain is already in flight.
    AlreadyDraining,
    /// The client is in degraded mode with no local store.
    NoLocalStore,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Offline => write!(f, "offline"),
            SkipReason::AlreadyDraining => write!(f, "already draining"),
            SkipReason::NoLocalStore => write!(f, "no local store"),
        }
    }
}

/// A mutation that will never be retried again.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalFailure {
    /// The removed queue entry's id.
    pub mutation_id: String,
    /// The record the mutation targeted.
    pub record_id: String,
    /// The action that could not be applied.
    pub action: MutationAction,
    /// The final error message.
    pub error: String,
}

/// Accounting for one completed drain cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainSummary {
    /// Mutations acknowledged by the remote.
    pub succeeded: usize,
    /// Mutations that failed this cycle (terminal or not).
    pub failed: usize,
    /// Queue size after the cycle.
    pub still_pending: usize,
    /// Mutations removed permanently this cycle.
    pub terminal: Vec<TerminalFailure>,
}

/// Result of a drain request.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// The request did not run.
    Skipped(SkipReason),
    /// A full cycle ran; per-item accounting attached.
    Completed(DrainSummary),
}

impl DrainOutcome {
    /// Returns the summary if a cycle actually ran.
    #[must_use]
    pub fn summary(&self) -> Option<&DrainSummary> {
        match self {
            DrainOutcome::Completed(summary) => Some(summary),
            DrainOutcome::Skipped(_) => None,
        }
    }
}

/// Snapshot of the subsystem's sync state, for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Mutations waiting in the queue.
    pub pending_count: usize,
    /// Completion time of the last drain cycle, epoch millis.
    pub last_sync_at: Option<i64>,
    /// True while a drain cycle is running.
    pub in_progress: bool,
    /// Current connectivity.
    pub connectivity: Connectivity,
}

/// Receives asynchronous sync events.
///
/// Remote failures never propagate to the caller that enqueued the mutation
/// (that call already returned); they surface here instead.
pub trait SyncObserver: Send + Sync {
    /// A mutation exhausted its attempt budget or was rejected permanently.
    fn on_terminal_failure(&self, _failure: &TerminalFailure) {}

    /// A drain cycle finished.
    fn on_drain_complete(&self, _summary: &DrainSummary) {}
}

/// Drains the mutation queue against a remote endpoint.
///
/// The manager owns no persisted data: it re-reads the queue from the store
/// at the start of every cycle, so interrupting or restarting it mid-sync
/// cannot lose or duplicate local state. Its only mutable state is the
/// drain-exclusivity gate and status bookkeeping.
pub struct SyncManager {
    store: Arc<ChartStore>,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Arc<ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    drain_gate: Mutex<()>,
    in_progress: AtomicBool,
    last_sync_at: RwLock<Option<i64>>,
    observers: RwLock<Vec<Arc<dyn SyncObserver>>>,
}

impl SyncManager {
    /// Creates a manager over the given collaborators.
    pub fn new(
        store: Arc<ChartStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        let clock = store.clock();
        Self {
            store,
            remote,
            connectivity,
            clock,
            config,
            drain_gate: Mutex::new(()),
            in_progress: AtomicBool::new(false),
            last_sync_at: RwLock::new(None),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Registers an observer for terminal failures and drain completions.
    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.write().push(observer);
    }

    /// The configuration this manager runs with.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Attempts one drain cycle.
    ///
    /// Returns `Skipped` without doing any work when offline or when another
    /// drain is already in flight; at most one drain runs at a time.
    ///
    /// # Errors
    ///
    /// Only store failures abort a cycle; remote failures are per-item
    /// accounting and never abort the batch.
    pub fn attempt_drain(&self) -> SyncResult<DrainOutcome> {
        if !self.connectivity.is_online() {
            debug!("drain skipped: offline");
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }

        let Some(guard) = self.drain_gate.try_lock() else {
            debug!("drain skipped: already draining");
            return Ok(DrainOutcome::Skipped(SkipReason::AlreadyDraining));
        };

        self.in_progress.store(true, Ordering::SeqCst);
        let result = self.drain_cycle();
        self.in_progress.store(false, Ordering::SeqCst);
        drop(guard);

        let summary = result?;
        for observer in self.observers.read().iter() {
            observer.on_drain_complete(&summary);
        }
        Ok(DrainOutcome::Completed(summary))
    }

    fn drain_cycle(&self) -> SyncResult<DrainSummary> {
        let now = self.clock.now_millis();

        // Authoritative, up-to-date list; not-yet-due retries are skipped
        // here, never reordered.
        let eligible: Vec<QueuedMutation> = self
            .store
            .pending_mutations()?
            .into_iter()
            .filter(|m| m.is_due(now))
            .collect();

        debug!(eligible = eligible.len(), "drain cycle started");

        let mut summary = DrainSummary::default();
        for item in eligible {
            // Checkpoint: going offline stops new dispatches, it does not
            // abort the call already made.
            if !self.connectivity.is_online() {
                debug!("went offline mid-drain, abandoning cycle");
                break;
            }

            match self
                .remote
                .apply(item.action, &item.record_id, item.payload_snapshot.as_ref())
            {
                Ok(_ack) => {
                    self.store.remove_mutation(&item.id)?;
                    if matches!(item.action, MutationAction::Create | MutationAction::Update) {
                        self.store.mark_record_synced(&item.record_id)?;
                    }
                    summary.succeeded += 1;
                }
                Err(err) => {
                    summary.failed += 1;
                    self.handle_item_failure(&item, &err, &mut summary)?;
                }
            }
        }

        summary.still_pending = self.store.pending_count()?;
        *self.last_sync_at.write() = Some(self.clock.now_millis());

        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            still_pending = summary.still_pending,
            "drain cycle finished"
        );
        Ok(summary)
    }

    fn handle_item_failure(
        &self,
        item: &QueuedMutation,
        err: &RemoteError,
        summary: &mut DrainSummary,
    ) -> SyncResult<()> {
        let attempts = item.attempts + 1;
        let terminal = attempts >= item.max_attempts || !err.is_retryable();

        if terminal {
            self.store.remove_mutation(&item.id)?;
            let failure = TerminalFailure {
                mutation_id: item.id.clone(),
                record_id: item.record_id.clone(),
                action: item.action,
                error: err.to_string(),
            };
            warn!(
                mutation = %failure.mutation_id,
                record = %failure.record_id,
                action = %failure.action,
                error = %failure.error,
                "mutation failed terminally"
            );
            for observer in self.observers.read().iter() {
                observer.on_terminal_failure(&failure);
            }
            summary.terminal.push(failure);
        } else {
            let delay = self.config.backoff.delay_for_attempt(attempts);
            let next_attempt_at = self.clock.now_millis() + delay.as_millis() as i64;
            let message = err.to_string();
            debug!(
                mutation = %item.id,
                attempts,
                next_attempt_at,
                "mutation failed, retry scheduled"
            );
            self.store
                .update_mutation(&item.id, |m| {
                    m.record_failure(message, next_attempt_at);
                })?;
        }
        Ok(())
    }

    /// Returns a status snapshot for the presentation layer.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            pending_count: self.store.pending_count()?,
            last_sync_at: *self.last_sync_at.read(),
            in_progress: self.in_progress.load(Ordering::SeqCst),
            connectivity: self.connectivity.current(),
        })
    }

    /// Wipes all local data, waiting out any in-flight drain first.
    ///
    /// Taking the drain gate serializes the wipe against drains, so a
    /// concurrent cycle can never resurrect deleted data.
    pub fn clear_all(&self) -> SyncResult<()> {
        let _guard = self.drain_gate.lock();
        self.store.clear_all()?;
        Ok(())
    }

    /// Runs `f` with drains held off.
    ///
    /// Used for read-decide-mutate sequences over the queue that must not
    /// interleave with a cycle, such as coalescing a delete with a pending
    /// create.
    pub(crate) fn with_drains_paused<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.drain_gate.lock();
        f()
    }
}
