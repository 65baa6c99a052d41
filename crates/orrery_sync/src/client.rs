//! The client facade consumed by the presentation layer.

use crate::config::SyncConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor, LinkQuality};
use crate::error::SyncResult;
use crate::manager::{DrainOutcome, SkipReason, SyncManager, SyncObserver, SyncStatus};
use crate::remote::RemoteEndpoint;
use crate::scheduler::SyncScheduler;
use orrery_store::{
    ChartRecord, ChartStore, Clock, EvictionLimits, MutationAction, Priority, QueuedMutation,
    SnapshotBackend, SystemClock,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Options for [`OfflineClient::save_record`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Record id to upsert. A fresh id is generated when absent.
    pub id: Option<String>,
    /// Eviction priority override. New records default to high.
    pub priority: Option<Priority>,
}

impl SaveOptions {
    /// Targets an existing (or caller-chosen) record id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Overrides the eviction priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Builder for [`OfflineClient`].
///
/// The backend and remote endpoint are mandatory; everything else has
/// production defaults. Multiple isolated clients can coexist, so tests
/// construct their own instead of sharing a global.
pub struct OfflineClientBuilder {
    backend: Box<dyn SnapshotBackend>,
    remote: Arc<dyn RemoteEndpoint>,
    clock: Arc<dyn Clock>,
    limits: EvictionLimits,
    config: SyncConfig,
    connectivity: Arc<ConnectivityMonitor>,
    background_scheduler: bool,
}

impl OfflineClientBuilder {
    /// Starts a builder over the given backend and remote endpoint.
    pub fn new(
        backend: impl SnapshotBackend + 'static,
        remote: impl RemoteEndpoint + 'static,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            remote: Arc::new(remote),
            clock: Arc::new(SystemClock),
            limits: EvictionLimits::default(),
            config: SyncConfig::default(),
            connectivity: Arc::new(ConnectivityMonitor::new()),
            background_scheduler: true,
        }
    }

    /// Injects a clock. Tests use [`orrery_store::ManualClock`].
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the eviction limits.
    #[must_use]
    pub fn with_limits(mut self, limits: EvictionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the sync configuration.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a connectivity monitor with other collaborators.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Enables or disables the periodic background scheduler.
    ///
    /// With the scheduler disabled there are no automatic drains; callers
    /// drive sync explicitly through [`OfflineClient::force_sync_now`].
    /// Tests disable it for determinism.
    #[must_use]
    pub fn with_background_scheduler(mut self, enabled: bool) -> Self {
        self.background_scheduler = enabled;
        self
    }

    /// Builds the client.
    ///
    /// A store that fails to open does not fail the build: the client comes
    /// up in degraded pass-through mode (no caching, no queueing), logging
    /// one warning. The primary write path of the surrounding application is
    /// unaffected.
    #[must_use]
    pub fn build(self) -> OfflineClient {
        let engine = match ChartStore::open(self.backend, self.limits, Arc::clone(&self.clock)) {
            Ok(store) => {
                let store = Arc::new(store);
                let manager = Arc::new(SyncManager::new(
                    Arc::clone(&store),
                    Arc::clone(&self.remote),
                    Arc::clone(&self.connectivity),
                    self.config.clone(),
                ));
                let scheduler = self.background_scheduler.then(|| {
                    SyncScheduler::start(Arc::clone(&manager), self.config.drain_interval)
                });
                Some(Engine {
                    store,
                    manager,
                    scheduler,
                })
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "local store unavailable, degrading to pass-through (no offline cache)"
                );
                None
            }
        };

        OfflineClient {
            engine,
            connectivity: self.connectivity,
            clock: self.clock,
            config: self.config,
        }
    }
}

struct Engine {
    store: Arc<ChartStore>,
    manager: Arc<SyncManager>,
    scheduler: Option<SyncScheduler>,
}

/// The offline persistence and sync subsystem, as seen by the UI layer.
///
/// Writes persist locally and return immediately; reconciliation with the
/// remote happens in the background. Remote failures never surface through
/// these methods: subscribe a [`SyncObserver`] or poll
/// [`sync_status`](Self::sync_status) instead.
pub struct OfflineClient {
    engine: Option<Engine>,
    connectivity: Arc<ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl OfflineClient {
    /// Starts a builder. See [`OfflineClientBuilder`].
    pub fn builder(
        backend: impl SnapshotBackend + 'static,
        remote: impl RemoteEndpoint + 'static,
    ) -> OfflineClientBuilder {
        OfflineClientBuilder::new(backend, remote)
    }

    /// True when the local store failed to open and caching is disabled.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.engine.is_none()
    }

    /// Persists a record locally, enqueues its sync, and returns the id.
    ///
    /// Never blocks on the network and never fails: storage trouble degrades
    /// to a warning and the returned id is still usable by the caller.
    pub fn save_record(&self, owner_id: &str, payload: Value, options: SaveOptions) -> String {
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let Some(engine) = &self.engine else {
            return id;
        };

        match self.save_to_store(engine, &id, owner_id, payload, &options) {
            Ok(()) => self.request_drain_soon(engine, Duration::ZERO),
            Err(err) => {
                warn!(record = %id, error = %err, "save not cached, continuing without offline copy");
            }
        }
        id
    }

    fn save_to_store(
        &self,
        engine: &Engine,
        id: &str,
        owner_id: &str,
        payload: Value,
        options: &SaveOptions,
    ) -> SyncResult<()> {
        let now = self.clock.now_millis();
        let max_attempts = self.config.max_attempts;

        let mutation = match engine.store.get_record(id)? {
            Some(mut existing) => {
                existing.replace_payload(payload.clone(), now);
                if let Some(priority) = options.priority {
                    existing.priority = priority;
                }
                engine.store.put_record(existing)?;
                QueuedMutation::update(id.to_string(), payload, now)
            }
            None => {
                let mut record =
                    ChartRecord::new(id.to_string(), owner_id.to_string(), payload.clone(), now);
                if let Some(priority) = options.priority {
                    record = record.with_priority(priority);
                }
                if !self.connectivity.is_online() {
                    record = record.offline_origin();
                }
                engine.store.put_record(record)?;
                QueuedMutation::create(id.to_string(), payload, now)
            }
        };

        engine
            .store
            .enqueue_mutation(mutation.with_max_attempts(max_attempts))?;
        Ok(())
    }

    /// Deletes a record locally and schedules the remote deletion.
    ///
    /// A record whose `Create` mutation is still queued never reached the
    /// remote: its queued mutations are dropped and no remote delete is
    /// enqueued, so the create/delete race cannot leave a remote orphan.
    pub fn delete_record_and_sync(&self, record_id: &str) {
        let Some(engine) = &self.engine else {
            return;
        };

        // The read-decide-mutate below must not interleave with a drain: a
        // cycle could apply the pending create between the check and the
        // coalesce, and the skipped remote delete would leave an orphan.
        let result = engine.manager.with_drains_paused(|| -> SyncResult<()> {
            let pending = engine.store.mutations_for_record(record_id)?;
            let never_reached_remote = pending
                .iter()
                .any(|m| m.action == MutationAction::Create);

            engine.store.delete_record(record_id)?;

            if never_reached_remote {
                let dropped = engine.store.remove_mutations_for_record(record_id)?;
                debug!(record = %record_id, dropped, "deleted before first sync, queue coalesced");
            } else {
                engine.store.enqueue_mutation(
                    QueuedMutation::delete(record_id.to_string(), self.clock.now_millis())
                        .with_max_attempts(self.config.max_attempts),
                )?;
            }
            Ok(())
        });

        match result {
            Ok(()) => self.request_drain_soon(engine, Duration::ZERO),
            Err(err) => {
                warn!(record = %record_id, error = %err, "local delete not persisted");
            }
        }
    }

    /// Returns the cached records for an owner, most recently used first.
    ///
    /// With `prefer_online` set and connectivity available, a best-effort
    /// background drain is requested; the returned list is always the local
    /// cache and never waits on the network.
    #[must_use]
    pub fn list_user_records(&self, owner_id: &str, prefer_online: bool) -> Vec<ChartRecord> {
        let Some(engine) = &self.engine else {
            return Vec::new();
        };

        if prefer_online {
            self.request_drain_soon(engine, Duration::ZERO);
        }

        match engine.store.list_records(owner_id) {
            Ok(records) => records,
            Err(err) => {
                warn!(owner = %owner_id, error = %err, "listing cached records failed");
                Vec::new()
            }
        }
    }

    /// Returns a snapshot of the sync state for rendering.
    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        let offline_status = || SyncStatus {
            pending_count: 0,
            last_sync_at: None,
            in_progress: false,
            connectivity: self.connectivity.current(),
        };

        match &self.engine {
            Some(engine) => engine.manager.status().unwrap_or_else(|err| {
                warn!(error = %err, "sync status unavailable");
                offline_status()
            }),
            None => offline_status(),
        }
    }

    /// Runs a drain cycle now, if possible, and reports what happened.
    ///
    /// # Errors
    ///
    /// Returns an error only for store failures; remote failures are
    /// accounted inside the returned summary.
    pub fn force_sync_now(&self) -> SyncResult<DrainOutcome> {
        match &self.engine {
            Some(engine) => engine.manager.attempt_drain(),
            None => Ok(DrainOutcome::Skipped(SkipReason::NoLocalStore)),
        }
    }

    /// Wipes all local records and pending mutations.
    ///
    /// Serialized against any in-flight drain, so logout cannot race a
    /// concurrent cycle into resurrecting deleted data.
    ///
    /// # Errors
    ///
    /// Returns an error if the wipe cannot be persisted.
    pub fn clear_all_local_data(&self) -> SyncResult<()> {
        match &self.engine {
            Some(engine) => engine.manager.clear_all(),
            None => Ok(()),
        }
    }

    /// Platform signal: connectivity is available.
    ///
    /// Triggers a drain after the configured debounce, letting the network
    /// stack settle first.
    pub fn notify_online(&self, quality: Option<LinkQuality>) {
        self.connectivity.set_online(quality);
        debug!(connectivity = %self.connectivity.current(), "platform reported online");
        if let Some(engine) = &self.engine {
            self.request_drain_soon(engine, self.config.online_debounce);
        }
    }

    /// Platform signal: connectivity was lost.
    ///
    /// Any in-flight drain stops dispatching at its next checkpoint.
    pub fn notify_offline(&self) {
        self.connectivity.set_offline();
        debug!("platform reported offline");
    }

    /// Current connectivity as seen by the subsystem.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.current()
    }

    /// Registers an observer for terminal failures and drain completions.
    ///
    /// In degraded mode there is nothing to observe and the registration is
    /// dropped.
    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        if let Some(engine) = &self.engine {
            engine.manager.add_observer(observer);
        }
    }

    fn request_drain_soon(&self, engine: &Engine, delay: Duration) {
        if !self.connectivity.is_online() {
            return;
        }
        let Some(scheduler) = &engine.scheduler else {
            return;
        };

        if delay.is_zero() {
            scheduler.nudge();
        } else {
            // Debounced: give the network stack time to stabilize.
            let manager = Arc::clone(&engine.manager);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                if let Err(err) = manager.attempt_drain() {
                    warn!(error = %err, "debounced drain failed");
                }
            });
        }
    }
}
