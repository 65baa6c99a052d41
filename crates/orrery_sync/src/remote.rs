//! Remote endpoint abstraction.

use orrery_store::MutationAction;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;

/// Failure reported by the remote authority.
///
/// The classification decides the item's fate: transient failures are
/// retried with backoff until the attempt budget runs out, permanent
/// failures remove the item immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connectivity or timeout failure; worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// The remote rejected the request; retrying cannot succeed.
    #[error("permanent remote failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    /// Returns true if this failure can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Successful acknowledgement from the remote authority.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteAck {
    /// The server's copy of the record, when it returns one.
    pub server_payload: Option<Value>,
}

impl RemoteAck {
    /// An acknowledgement with no server payload.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Attaches the server's copy of the record.
    #[must_use]
    pub fn with_server_payload(mut self, payload: Value) -> Self {
        self.server_payload = Some(payload);
        self
    }
}

/// The single network dependency of the sync subsystem.
///
/// Implementations apply one mutation to the remote authority. Calls must be
/// idempotent-safe: the sync manager may retry a mutation whose previous
/// attempt failed after the remote had already applied it.
pub trait RemoteEndpoint: Send + Sync {
    /// Applies one mutation to the remote authority.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transient`] for failures worth retrying and
    /// [`RemoteError::Permanent`] for rejections.
    fn apply(
        &self,
        action: MutationAction,
        record_id: &str,
        payload: Option<&Value>,
    ) -> Result<RemoteAck, RemoteError>;
}

impl<R: RemoteEndpoint + ?Sized> RemoteEndpoint for std::sync::Arc<R> {
    fn apply(
        &self,
        action: MutationAction,
        record_id: &str,
        payload: Option<&Value>,
    ) -> Result<RemoteAck, RemoteError> {
        (**self).apply(action, record_id, payload)
    }
}

/// One recorded call against a [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// The action that was applied.
    pub action: MutationAction,
    /// The targeted record.
    pub record_id: String,
    /// The payload that was sent.
    pub payload: Option<Value>,
}

/// A scripted remote endpoint for testing.
///
/// Responses are consumed in FIFO order; when the script is empty every call
/// succeeds with an empty acknowledgement. All calls are recorded.
#[derive(Debug, Default)]
pub struct MockRemote {
    script: Mutex<VecDeque<Result<RemoteAck, RemoteError>>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl MockRemote {
    /// Creates a mock that acknowledges every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an explicit response for the next unscripted call.
    pub fn push_response(&self, response: Result<RemoteAck, RemoteError>) {
        self.script.lock().push_back(response);
    }

    /// Queues a transient failure.
    pub fn push_transient_failure(&self, message: impl Into<String>) {
        self.push_response(Err(RemoteError::Transient(message.into())));
    }

    /// Queues a permanent failure.
    pub fn push_permanent_failure(&self, message: impl Into<String>) {
        self.push_response(Err(RemoteError::Permanent(message.into())));
    }

    /// Returns all recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl RemoteEndpoint for MockRemote {
    fn apply(
        &self,
        action: MutationAction,
        record_id: &str,
        payload: Option<&Value>,
    ) -> Result<RemoteAck, RemoteError> {
        self.calls.lock().push(RemoteCall {
            action,
            record_id: record_id.to_string(),
            payload: payload.cloned(),
        });

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteAck::ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification() {
        assert!(RemoteError::Transient("timeout".into()).is_retryable());
        assert!(!RemoteError::Permanent("validation".into()).is_retryable());
    }

    #[test]
    fn mock_defaults_to_success() {
        let remote = MockRemote::new();
        let ack = remote
            .apply(MutationAction::Create, "r1", Some(&json!({"a": 1})))
            .unwrap();
        assert!(ack.server_payload.is_none());
        assert_eq!(remote.call_count(), 1);
    }

    #[test]
    fn mock_consumes_script_in_order() {
        let remote = MockRemote::new();
        remote.push_transient_failure("timeout");
        remote.push_response(Ok(RemoteAck::ok().with_server_payload(json!({"v": 2}))));

        let first = remote.apply(MutationAction::Update, "r1", None);
        assert_eq!(first, Err(RemoteError::Transient("timeout".into())));

        let second = remote.apply(MutationAction::Update, "r1", None).unwrap();
        assert_eq!(second.server_payload, Some(json!({"v": 2})));

        // Script exhausted: back to default success.
        assert!(remote.apply(MutationAction::Delete, "r1", None).is_ok());
    }

    #[test]
    fn mock_records_calls() {
        let remote = MockRemote::new();
        remote.apply(MutationAction::Create, "r1", None).unwrap();
        remote.apply(MutationAction::Delete, "r2", None).unwrap();

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].record_id, "r1");
        assert_eq!(calls[1].action, MutationAction::Delete);
    }
}
