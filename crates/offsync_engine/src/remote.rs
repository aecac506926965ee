//! Remote store abstraction for apply calls.

use async_trait::async_trait;
use offsync_protocol::{ApplyOutcome, ApplyRequest, RemoteError, RecordKey};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// The remote side of a sync: applies one mutation against the
/// authoritative store.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, gRPC, mock for testing, etc.). Implementations
/// must be safe to call from multiple workers at once; the processor
/// guarantees it never issues two concurrent calls for the same record.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Applies one mutation remotely.
    ///
    /// `Ok(ApplyOutcome)` means the server answered: either the mutation
    /// landed or the version check failed. `Err(RemoteError)` means no
    /// outcome was produced.
    async fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome, RemoteError>;
}

/// Scripted outcome for one [`MockRemote`] call.
pub type MockOutcome = Result<ApplyOutcome, RemoteError>;

/// A mock remote store for testing.
///
/// Outcomes are scripted per record key and consumed in order; keys
/// without a script answer with the default outcome. Every request is
/// recorded for assertion.
#[derive(Debug, Default)]
pub struct MockRemote {
    scripts: Mutex<HashMap<RecordKey, VecDeque<MockOutcome>>>,
    default_outcome: Mutex<Option<MockOutcome>>,
    requests: Mutex<Vec<ApplyRequest>>,
}

impl MockRemote {
    /// Creates a mock that applies everything at version 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome for the next call touching `key`.
    pub fn script(&self, key: RecordKey, outcome: MockOutcome) {
        self.scripts.lock().entry(key).or_default().push_back(outcome);
    }

    /// Sets the outcome for calls with no script.
    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        *self.default_outcome.lock() = Some(outcome);
    }

    /// Requests seen so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApplyRequest> {
        self.requests.lock().clone()
    }

    /// Requests seen for one record, in call order.
    #[must_use]
    pub fn requests_for(&self, key: &RecordKey) -> Vec<ApplyRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| &r.key == key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome, RemoteError> {
        self.requests.lock().push(request.clone());
        if let Some(outcome) = self
            .scripts
            .lock()
            .get_mut(&request.key)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        match self.default_outcome.lock().clone() {
            Some(outcome) => outcome,
            None => Ok(ApplyOutcome::Applied {
                new_version: offsync_protocol::Version(request.base_version.0 + 1),
            }),
        }
    }
}
