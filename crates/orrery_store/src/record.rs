//! Cached chart documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Eviction weight of a cached record.
///
/// Higher priorities survive capacity pressure longer. New and
/// offline-created records default to [`Priority::High`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Evicted first.
    Low,
    /// Evicted after all low-priority candidates.
    Medium,
    /// Evicted last.
    High,
}

impl Priority {
    /// Numeric eviction weight. Lower weights are evicted first.
    #[must_use]
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

/// A cached chart document mirrored from/to the remote authority.
///
/// The payload is opaque to the sync core: any JSON value the presentation
/// layer produces is stored and shipped as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    /// Unique record id.
    pub id: String,
    /// The principal this record belongs to.
    pub owner_id: String,
    /// Domain data, uninterpreted by the sync core.
    pub payload: Value,
    /// Creation time, epoch millis.
    pub created_at: i64,
    /// Last local modification time, epoch millis.
    pub updated_at: i64,
    /// Last read time, epoch millis. Drives eviction recency.
    pub last_accessed_at: i64,
    /// True iff the remote authority holds an equal-or-newer copy.
    pub synced: bool,
    /// True if the record was created while disconnected.
    pub originated_offline: bool,
    /// Eviction weight.
    pub priority: Priority,
    /// Byte footprint of the serialized payload, computed at write time.
    pub size_bytes: u64,
}

impl ChartRecord {
    /// Creates a new unsynced record stamped at `now`.
    #[must_use]
    pub fn new(id: String, owner_id: String, payload: Value, now: i64) -> Self {
        let size_bytes = payload_size(&payload);
        Self {
            id,
            owner_id,
            payload,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            synced: false,
            originated_offline: false,
            priority: Priority::High,
            size_bytes,
        }
    }

    /// Marks the record as created while disconnected.
    #[must_use]
    pub fn offline_origin(mut self) -> Self {
        self.originated_offline = true;
        self
    }

    /// Sets the eviction priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the payload, recomputing the byte footprint and marking the
    /// record unsynced.
    pub fn replace_payload(&mut self, payload: Value, now: i64) {
        self.size_bytes = payload_size(&payload);
        self.payload = payload;
        self.updated_at = now;
        self.last_accessed_at = now;
        self.synced = false;
    }

    /// Updates the access timestamp.
    pub fn touch(&mut self, now: i64) {
        self.last_accessed_at = now;
    }

    /// Composite eviction key: lowest priority first, then least recently
    /// accessed.
    #[must_use]
    pub fn eviction_key(&self) -> (u8, i64) {
        (self.priority.weight(), self.last_accessed_at)
    }
}

/// Byte footprint of a payload as it would be serialized.
#[must_use]
pub fn payload_size(payload: &Value) -> u64 {
    serde_json::to_vec(payload).map_or(0, |bytes| bytes.len() as u64)
}
