//! Mutation queue entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default attempt budget for a queued mutation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The kind of remote operation a queue entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    /// The record must be created on the remote.
    Create,
    /// The record must be updated on the remote.
    Update,
    /// The record must be deleted on the remote.
    Delete,
}

impl MutationAction {
    /// Stable lowercase name, used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Create => "create",
            MutationAction::Update => "update",
            MutationAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MutationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending local change awaiting application to the remote authority.
///
/// Entries live in the store's mutation queue in enqueue order. The sync
/// manager increments `attempts` on failure and stamps `next_attempt_at`
/// with the backoff-computed eligibility time; entries whose time has not
/// come are skipped, never reordered.
///
/// # Invariants
///
/// - `attempts <= max_attempts`
/// - Reaching `max_attempts` removes the entry permanently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique queue entry id.
    pub id: String,
    /// The remote operation to perform.
    pub action: MutationAction,
    /// The target record's id.
    pub record_id: String,
    /// The data to send. `None` for deletes.
    pub payload_snapshot: Option<Value>,
    /// Enqueue time, epoch millis.
    pub enqueued_at: i64,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Attempt budget, fixed at enqueue time.
    pub max_attempts: u32,
    /// Message from the most recent failure.
    pub last_error: Option<String>,
    /// Earliest time this entry may be retried, epoch millis.
    /// Zero means immediately eligible.
    pub next_attempt_at: i64,
}

impl QueuedMutation {
    fn new(
        action: MutationAction,
        record_id: String,
        payload_snapshot: Option<Value>,
        now: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            record_id,
            payload_snapshot,
            enqueued_at: now,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_error: None,
            next_attempt_at: 0,
        }
    }

    /// Creates a `Create` entry carrying the full payload.
    #[must_use]
    pub fn create(record_id: String, payload: Value, now: i64) -> Self {
        Self::new(MutationAction::Create, record_id, Some(payload), now)
    }

    /// Creates an `Update` entry carrying the payload to send.
    #[must_use]
    pub fn update(record_id: String, payload: Value, now: i64) -> Self {
        Self::new(MutationAction::Update, record_id, Some(payload), now)
    }

    /// Creates a `Delete` entry with no payload.
    #[must_use]
    pub fn delete(record_id: String, now: i64) -> Self {
        Self::new(MutationAction::Delete, record_id, None, now)
    }

    /// Overrides the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns true if the entry may be attempted at `now`.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        self.next_attempt_at <= now
    }

    /// Records a failed attempt.
    ///
    /// Returns true if the attempt budget is now exhausted and the entry must
    /// be removed from the queue.
    pub fn record_failure(&mut self, error: impl Into<String>, next_attempt_at: i64) -> bool {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.last_error = Some(error.into());
        self.next_attempt_at = next_attempt_at;
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_action_and_payload() {
        let create = QueuedMutation::create("r1".into(), json!({"a": 1}), 10);
        assert_eq!(create.action, MutationAction::Create);
        assert!(create.payload_snapshot.is_some());
        assert_eq!(create.enqueued_at, 10);
        assert_eq!(create.attempts, 0);
        assert_eq!(create.max_attempts, DEFAULT_MAX_ATTEMPTS);

        let delete = QueuedMutation::delete("r1".into(), 20);
        assert_eq!(delete.action, MutationAction::Delete);
        assert!(delete.payload_snapshot.is_none());
    }

    #[test]
    fn due_when_next_attempt_elapsed() {
        let mut mutation = QueuedMutation::update("r1".into(), json!({}), 0);
        assert!(mutation.is_due(0));

        mutation.next_attempt_at = 1_000;
        assert!(!mutation.is_due(999));
        assert!(mutation.is_due(1_000));
    }

    #[test]
    fn failure_accounting_stops_at_budget() {
        let mut mutation =
            QueuedMutation::create("r1".into(), json!({}), 0).with_max_attempts(3);

        assert!(!mutation.record_failure("timeout", 100));
        assert_eq!(mutation.attempts, 1);
        assert_eq!(mutation.last_error.as_deref(), Some("timeout"));
        assert_eq!(mutation.next_attempt_at, 100);

        assert!(!mutation.record_failure("timeout", 200));
        assert!(mutation.record_failure("timeout", 400));
        assert_eq!(mutation.attempts, 3);

        // A further failure never pushes attempts past the budget.
        assert!(mutation.record_failure("timeout", 800));
        assert_eq!(mutation.attempts, 3);
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let mutation = QueuedMutation::delete("r1".into(), 0).with_max_attempts(0);
        assert_eq!(mutation.max_attempts, 1);
    }

    #[test]
    fn action_names() {
        assert_eq!(MutationAction::Create.as_str(), "create");
        assert_eq!(MutationAction::Update.as_str(), "update");
        assert_eq!(MutationAction::Delete.to_string(), "delete");
    }
}
