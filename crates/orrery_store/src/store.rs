//! The durable store: records plus the mutation queue.

use crate::backend::SnapshotBackend;
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::eviction::{self, EvictionLimits};
use crate::mutation::QueuedMutation;
use crate::record::{self, ChartRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Both persisted collections, encoded together as one snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    records: HashMap<String, ChartRecord>,
    queue: Vec<QueuedMutation>,
}

/// The durable offline store.
///
/// Holds the cached records and the mutation queue behind a single lock and
/// persists both as one CBOR snapshot after every mutating operation, so a
/// put and the evictions it triggers are a single durability point.
///
/// All reads return clones; callers never hold references into the store.
///
/// # Concurrency
///
/// Operations are serialized by the internal lock. The store is `Send + Sync`
/// and is normally shared as `Arc<ChartStore>`.
pub struct ChartStore {
    limits: EvictionLimits,
    clock: Arc<dyn Clock>,
    backend: Box<dyn SnapshotBackend>,
    state: RwLock<Collections>,
}

impl ChartStore {
    /// Opens a store over the given backend, loading any persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the snapshot cannot
    /// be decoded. Callers are expected to degrade to a no-cache mode on
    /// failure rather than abort.
    pub fn open(
        backend: impl SnapshotBackend + 'static,
        limits: EvictionLimits,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let state = match backend.load()? {
            Some(bytes) => ciborium::de::from_reader(bytes.as_slice())
                .map_err(|err| StoreError::codec(err.to_string()))?,
            None => Collections::default(),
        };

        debug!(
            records = state.records.len(),
            pending = state.queue.len(),
            "store opened"
        );

        Ok(Self {
            limits,
            clock,
            backend: Box::new(backend),
            state: RwLock::new(state),
        })
    }

    fn persist_locked(&self, state: &Collections) -> StoreResult<()> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(state, &mut buf)
            .map_err(|err| StoreError::codec(err.to_string()))?;
        self.backend.persist(&buf)
    }

    /// Inserts or overwrites a record by id.
    ///
    /// The payload footprint is recomputed at write time and the eviction
    /// policy runs before the snapshot is written. Returns the record id.
    pub fn put_record(&self, mut rec: ChartRecord) -> StoreResult<String> {
        let mut state = self.state.write();

        rec.size_bytes = record::payload_size(&rec.payload);
        let id = rec.id.clone();
        trace!(record = %id, "put record");
        state.records.insert(id.clone(), rec);

        let evicted = eviction::plan(&state.records, &self.limits);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicting records over capacity");
            for victim in &evicted {
                state.records.remove(victim);
            }
        }

        self.persist_locked(&state)?;
        Ok(id)
    }

    /// Fetches a record by id, updating its access time as a side effect.
    pub fn get_record(&self, id: &str) -> StoreResult<Option<ChartRecord>> {
        let mut state = self.state.write();

        let copy = match state.records.get_mut(id) {
            Some(rec) => {
                rec.touch(self.clock.now_millis());
                Some(rec.clone())
            }
            None => None,
        };

        if copy.is_some() {
            self.persist_locked(&state)?;
        }
        Ok(copy)
    }

    /// Returns all records for an owner, most recently accessed first.
    pub fn list_records(&self, owner_id: &str) -> StoreResult<Vec<ChartRecord>> {
        let state = self.state.read();
        let mut records: Vec<ChartRecord> = state
            .records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.last_accessed_at));
        Ok(records)
    }

    /// Removes a record from local storage regardless of sync state.
    ///
    /// Returns true if a record was removed.
    pub fn delete_record(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.records.remove(id).is_some();
        if removed {
            trace!(record = %id, "deleted record");
            self.persist_locked(&state)?;
        }
        Ok(removed)
    }

    /// Marks a record as confirmed by the remote.
    ///
    /// A missing record is not an error: it may have been deleted locally
    /// while its mutation was in flight.
    pub fn mark_record_synced(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        if let Some(rec) = state.records.get_mut(id) {
            rec.synced = true;
            self.persist_locked(&state)?;
        }
        Ok(())
    }

    /// Appends a mutation to the queue. Returns the mutation id.
    pub fn enqueue_mutation(&self, mutation: QueuedMutation) -> StoreResult<String> {
        let mut state = self.state.write();
        let id = mutation.id.clone();
        trace!(mutation = %id, action = %mutation.action, record = %mutation.record_id, "enqueued mutation");
        state.queue.push(mutation);
        self.persist_locked(&state)?;
        Ok(id)
    }

    /// Returns all pending mutations, oldest-enqueued first.
    pub fn pending_mutations(&self) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.state.read().queue.clone())
    }

    /// Returns the pending mutations targeting one record, oldest first.
    pub fn mutations_for_record(&self, record_id: &str) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self
            .state
            .read()
            .queue
            .iter()
            .filter(|m| m.record_id == record_id)
            .cloned()
            .collect())
    }

    /// Removes a mutation from the queue.
    ///
    /// Removal is idempotent: removing an id that is no longer queued is a
    /// no-op, which keeps a restarted drain safe.
    pub fn remove_mutation(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        let before = state.queue.len();
        state.queue.retain(|m| m.id != id);
        if state.queue.len() != before {
            self.persist_locked(&state)?;
        }
        Ok(())
    }

    /// Removes every queued mutation targeting a record.
    ///
    /// Returns the number of entries removed.
    pub fn remove_mutations_for_record(&self, record_id: &str) -> StoreResult<usize> {
        let mut state = self.state.write();
        let before = state.queue.len();
        state.queue.retain(|m| m.record_id != record_id);
        let removed = before - state.queue.len();
        if removed > 0 {
            self.persist_locked(&state)?;
        }
        Ok(removed)
    }

    /// Applies an in-place update to a queued mutation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MutationNotFound`] if the id is not queued.
    pub fn update_mutation(
        &self,
        id: &str,
        apply: impl FnOnce(&mut QueuedMutation),
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        match state.queue.iter_mut().find(|m| m.id == id) {
            Some(mutation) => {
                apply(mutation);
                self.persist_locked(&state)
            }
            None => Err(StoreError::MutationNotFound { id: id.to_string() }),
        }
    }

    /// Wipes both collections. Used on logout or account switch.
    pub fn clear_all(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        state.records.clear();
        state.queue.clear();
        debug!("cleared all local data");
        self.persist_locked(&state)
    }

    /// Number of cached records.
    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self.state.read().records.len())
    }

    /// Combined payload footprint of all cached records.
    pub fn total_payload_bytes(&self) -> StoreResult<u64> {
        Ok(self.state.read().records.values().map(|r| r.size_bytes).sum())
    }

    /// Number of pending mutations.
    pub fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.state.read().queue.len())
    }

    /// The clock this store stamps timestamps with.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryBackend;
    use crate::record::Priority;
    use serde_json::json;

    fn open_store(limits: EvictionLimits) -> (ChartStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store =
            ChartStore::open(MemoryBackend::new(), limits, Arc::clone(&clock) as _).unwrap();
        (store, clock)
    }

    fn record(store: &ChartStore, id: &str, owner: &str) -> ChartRecord {
        ChartRecord::new(
            id.into(),
            owner.into(),
            json!({"chart": id}),
            store.clock().now_millis(),
        )
    }

    #[test]
    fn put_then_get_roundtrip() {
        let (store, _clock) = open_store(EvictionLimits::default());

        let id = store.put_record(record(&store, "r1", "owner")).unwrap();
        assert_eq!(id, "r1");

        let fetched = store.get_record("r1").unwrap().unwrap();
        assert_eq!(fetched.owner_id, "owner");
        assert!(!fetched.synced);

        assert!(store.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn get_updates_last_accessed() {
        let (store, clock) = open_store(EvictionLimits::default());
        store.put_record(record(&store, "r1", "owner")).unwrap();

        clock.advance(5_000);
        let fetched = store.get_record("r1").unwrap().unwrap();
        assert_eq!(fetched.last_accessed_at, 6_000);
    }

    #[test]
    fn put_recomputes_size() {
        let (store, _clock) = open_store(EvictionLimits::default());

        let mut rec = record(&store, "r1", "owner");
        rec.size_bytes = 999_999; // stale caller-supplied value
        store.put_record(rec).unwrap();

        let fetched = store.get_record("r1").unwrap().unwrap();
        assert_eq!(
            fetched.size_bytes,
            record::payload_size(&json!({"chart": "r1"}))
        );
    }

    #[test]
    fn list_is_mru_first_and_scoped_to_owner() {
        let (store, clock) = open_store(EvictionLimits::default());

        store.put_record(record(&store, "a", "alice")).unwrap();
        clock.advance(10);
        store.put_record(record(&store, "b", "alice")).unwrap();
        clock.advance(10);
        store.put_record(record(&store, "c", "bob")).unwrap();

        clock.advance(10);
        store.get_record("a").unwrap(); // bump recency of "a"

        let listed = store.list_records("alice").unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn delete_record_is_immediate() {
        let (store, _clock) = open_store(EvictionLimits::default());
        store.put_record(record(&store, "r1", "owner")).unwrap();

        assert!(store.delete_record("r1").unwrap());
        assert!(!store.delete_record("r1").unwrap());
        assert!(store.get_record("r1").unwrap().is_none());
    }

    #[test]
    fn queue_preserves_enqueue_order() {
        let (store, _clock) = open_store(EvictionLimits::default());

        let m1 = store
            .enqueue_mutation(QueuedMutation::create("r1".into(), json!({"v": 1}), 10))
            .unwrap();
        let m2 = store
            .enqueue_mutation(QueuedMutation::update("r1".into(), json!({"v": 2}), 20))
            .unwrap();
        let m3 = store
            .enqueue_mutation(QueuedMutation::delete("r2".into(), 30))
            .unwrap();

        let pending = store.pending_mutations().unwrap();
        let ids: Vec<_> = pending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![m1.as_str(), m2.as_str(), m3.as_str()]);
    }

    #[test]
    fn remove_mutation_is_idempotent() {
        let (store, _clock) = open_store(EvictionLimits::default());
        let id = store
            .enqueue_mutation(QueuedMutation::delete("r1".into(), 10))
            .unwrap();

        store.remove_mutation(&id).unwrap();
        store.remove_mutation(&id).unwrap();
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[test]
    fn update_mutation_applies_in_place() {
        let (store, _clock) = open_store(EvictionLimits::default());
        let id = store
            .enqueue_mutation(QueuedMutation::create("r1".into(), json!({}), 10))
            .unwrap();

        store
            .update_mutation(&id, |m| {
                m.record_failure("timeout", 5_000);
            })
            .unwrap();

        let pending = store.pending_mutations().unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].next_attempt_at, 5_000);

        let missing = store.update_mutation("nope", |_| {});
        assert!(matches!(missing, Err(StoreError::MutationNotFound { .. })));
    }

    #[test]
    fn remove_mutations_for_record_scopes_by_target() {
        let (store, _clock) = open_store(EvictionLimits::default());
        store
            .enqueue_mutation(QueuedMutation::create("r1".into(), json!({}), 10))
            .unwrap();
        store
            .enqueue_mutation(QueuedMutation::update("r1".into(), json!({}), 20))
            .unwrap();
        store
            .enqueue_mutation(QueuedMutation::create("r2".into(), json!({}), 30))
            .unwrap();

        assert_eq!(store.remove_mutations_for_record("r1").unwrap(), 2);

        let pending = store.pending_mutations().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, "r2");
    }

    #[test]
    fn mark_synced_tolerates_missing_record() {
        let (store, _clock) = open_store(EvictionLimits::default());
        store.put_record(record(&store, "r1", "owner")).unwrap();

        store.mark_record_synced("r1").unwrap();
        assert!(store.get_record("r1").unwrap().unwrap().synced);

        store.mark_record_synced("gone").unwrap();
    }

    #[test]
    fn put_triggers_eviction_of_synced_records() {
        let (store, clock) = open_store(EvictionLimits::default().with_max_records(2));

        store.put_record(record(&store, "old", "owner")).unwrap();
        store.mark_record_synced("old").unwrap();
        clock.advance(10);
        store.put_record(record(&store, "newer", "owner")).unwrap();
        store.mark_record_synced("newer").unwrap();
        clock.advance(10);
        store.put_record(record(&store, "newest", "owner")).unwrap();

        assert_eq!(store.record_count().unwrap(), 2);
        assert!(store.get_record("old").unwrap().is_none());
        assert!(store.get_record("newer").unwrap().is_some());
        assert!(store.get_record("newest").unwrap().is_some());
    }

    #[test]
    fn unsynced_records_survive_capacity_pressure() {
        let (store, _clock) = open_store(EvictionLimits::default().with_max_records(1));

        store.put_record(record(&store, "a", "owner")).unwrap();
        store.put_record(record(&store, "b", "owner")).unwrap();
        store.put_record(record(&store, "c", "owner")).unwrap();

        // Nothing is synced, so nothing is evictable.
        assert_eq!(store.record_count().unwrap(), 3);
    }

    #[test]
    fn eviction_prefers_low_priority() {
        let (store, _clock) = open_store(EvictionLimits::default().with_max_records(2));

        let low = record(&store, "low", "owner").with_priority(Priority::Low);
        let high = record(&store, "high", "owner").with_priority(Priority::High);
        store.put_record(low).unwrap();
        store.put_record(high).unwrap();
        store.mark_record_synced("low").unwrap();
        store.mark_record_synced("high").unwrap();

        store.put_record(record(&store, "extra", "owner")).unwrap();

        assert!(store.get_record("low").unwrap().is_none());
        assert!(store.get_record("high").unwrap().is_some());
    }

    #[test]
    fn clear_all_wipes_both_collections() {
        let (store, _clock) = open_store(EvictionLimits::default());
        store.put_record(record(&store, "r1", "owner")).unwrap();
        store
            .enqueue_mutation(QueuedMutation::create("r1".into(), json!({}), 10))
            .unwrap();

        store.clear_all().unwrap();

        assert_eq!(store.record_count().unwrap(), 0);
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let clock = Arc::new(ManualClock::new(1_000));
        let backend = Arc::new(MemoryBackend::new());

        {
            let store = ChartStore::open(
                Arc::clone(&backend),
                EvictionLimits::default(),
                Arc::clone(&clock) as _,
            )
            .unwrap();
            store
                .put_record(ChartRecord::new(
                    "r1".into(),
                    "owner".into(),
                    json!({"sun": "aries"}),
                    1_000,
                ))
                .unwrap();
            store
                .enqueue_mutation(QueuedMutation::create("r1".into(), json!({}), 1_000))
                .unwrap();
        }

        let reopened = ChartStore::open(
            Arc::clone(&backend),
            EvictionLimits::default(),
            clock as _,
        )
        .unwrap();
        assert_eq!(reopened.record_count().unwrap(), 1);
        assert_eq!(reopened.pending_count().unwrap(), 1);
        assert_eq!(
            reopened.get_record("r1").unwrap().unwrap().payload,
            json!({"sun": "aries"})
        );
    }

    #[test]
    fn corrupt_snapshot_fails_open() {
        let backend = MemoryBackend::with_snapshot(b"not cbor at all".to_vec());
        let result = ChartStore::open(
            backend,
            EvictionLimits::default(),
            Arc::new(ManualClock::new(0)) as _,
        );
        assert!(matches!(result, Err(StoreError::Codec { .. })));
    }

    #[test]
    fn unavailable_backend_fails_open_and_ops() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_failing(true);
        let result = ChartStore::open(
            Arc::clone(&backend),
            EvictionLimits::default(),
            Arc::new(ManualClock::new(0)) as _,
        );
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));

        backend.set_failing(false);
        let store = ChartStore::open(
            Arc::clone(&backend),
            EvictionLimits::default(),
            Arc::new(ManualClock::new(0)) as _,
        )
        .unwrap();
        backend.set_failing(true);
        let result = store.put_record(ChartRecord::new(
            "r1".into(),
            "owner".into(),
            json!({}),
            0,
        ));
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
