//! Capacity-bounded eviction policy.
//!
//! Eviction is a pure local-cache trim: evicted records still exist on the
//! remote, so removals never enqueue remote deletes. Records that the remote
//! has not confirmed (`synced == false`) are exempt; under pressure from
//! exempt records the store is allowed to exceed its limits rather than risk
//! data loss.

use crate::record::ChartRecord;
use std::collections::HashMap;

/// Capacity bounds for the records collection.
#[derive(Debug, Clone)]
pub struct EvictionLimits {
    /// Maximum number of cached records.
    pub max_records: usize,
    /// Maximum combined payload footprint in bytes.
    pub max_total_bytes: u64,
}

impl EvictionLimits {
    /// Sets the record count limit.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Sets the total byte limit.
    #[must_use]
    pub fn with_max_total_bytes(mut self, max_total_bytes: u64) -> Self {
        self.max_total_bytes = max_total_bytes;
        self
    }
}

impl Default for EvictionLimits {
    fn default() -> Self {
        Self {
            max_records: 100,
            max_total_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Selects the record ids to evict so the collection fits its limits.
///
/// Candidates exclude unsynced records. They are ranked ascending by
/// `(priority weight, last_accessed_at)`: lowest-priority, least-recently
/// used first, ties broken by older access time. Ids are returned in
/// eviction order until both limits are satisfied or no candidates remain.
#[must_use]
pub fn plan(records: &HashMap<String, ChartRecord>, limits: &EvictionLimits) -> Vec<String> {
    let mut count = records.len();
    let mut total_bytes: u64 = records.values().map(|r| r.size_bytes).sum();

    if count <= limits.max_records && total_bytes <= limits.max_total_bytes {
        return Vec::new();
    }

    let mut candidates: Vec<&ChartRecord> = records.values().filter(|r| r.synced).collect();
    candidates.sort_by_key(|r| (r.eviction_key(), r.id.clone()));

    let mut evict = Vec::new();
    for record in candidates {
        if count <= limits.max_records && total_bytes <= limits.max_total_bytes {
            break;
        }
        evict.push(record.id.clone());
        count -= 1;
        total_bytes = total_bytes.saturating_sub(record.size_bytes);
    }

    evict
}
