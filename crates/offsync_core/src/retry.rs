//! Retry ledger: per-operation attempts, backoff schedule, terminal state.

use crate::journal::JournalRecord;
use offsync_protocol::{MutationAction, OperationId, RecordKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle of a retry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// Waiting for its backoff deadline.
    Pending,
    /// An attempt is running right now.
    Retrying,
    /// A later attempt succeeded. Terminal.
    Succeeded,
    /// Attempts are used up (or the failure was permanent). Terminal;
    /// requires manual intervention.
    Exhausted,
}

impl RetryStatus {
    /// Returns the lowercase name used in listings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        }
    }

    /// Terminal records never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry bookkeeping for one queued operation that failed transiently.
///
/// Invariant: `retry_count <= max_retries`; once `retry_count` reaches
/// `max_retries` with the latest attempt failed, the record is
/// `Exhausted` and the engine takes no further automatic action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    /// The queued operation this record belongs to.
    pub operation_id: OperationId,
    /// Record the operation touches (for display).
    pub key: RecordKey,
    /// What the operation does (for display).
    pub action: MutationAction,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempt budget.
    pub max_retries: u32,
    /// Current backoff wait in milliseconds.
    pub backoff_ms: u64,
    /// Lifecycle state.
    pub status: RetryStatus,
    /// When the last attempt ran.
    pub last_attempt_at: Timestamp,
    /// Earliest time the next attempt may run.
    pub next_retry_at: Timestamp,
    /// Error from the most recent failure.
    pub last_error: Option<String>,
}

impl RetryRecord {
    /// Returns true if the operation may be attempted at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        matches!(self.status, RetryStatus::Pending | RetryStatus::Retrying)
            && now >= self.next_retry_at
    }
}

/// In-memory projection of retry state, keyed by operation.
#[derive(Debug, Default)]
pub struct RetryLedger {
    records: HashMap<OperationId, RetryRecord>,
}

impl RetryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one record.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&RetryRecord> {
        self.records.get(&id)
    }

    /// Returns every record, oldest next-attempt first.
    #[must_use]
    pub fn list(&self) -> Vec<RetryRecord> {
        let mut records: Vec<RetryRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| (r.next_retry_at, r.operation_id));
        records
    }

    /// Earliest `next_retry_at` among non-terminal records, if any.
    ///
    /// The processor sleeps until this deadline (or its tick interval,
    /// whichever is sooner).
    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.records
            .values()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.next_retry_at)
            .min()
    }

    /// Returns true if `collection` has any exhausted record.
    #[must_use]
    pub fn has_exhausted(&self, collection: &str) -> bool {
        self.records
            .values()
            .any(|r| r.status == RetryStatus::Exhausted && r.key.collection == collection)
    }

    /// Returns true if `collection` has any record still being retried.
    #[must_use]
    pub fn has_active(&self, collection: &str) -> bool {
        self.records.values().any(|r| {
            !r.status.is_terminal() && r.key.collection == collection
        })
    }

    /// Applies one journal record to this projection.
    pub fn apply(&mut self, record: &JournalRecord) {
        if let JournalRecord::RetryUpserted { record } = record {
            let current = self.records.get(&record.operation_id);
            // Terminal records only accept replays of themselves, except
            // that an exhausted record may be reset to pending by an
            // operator resubmit.
            if let Some(existing) = current {
                if existing.status.is_terminal() && existing != record {
                    let resubmit = existing.status == RetryStatus::Exhausted
                        && record.status == RetryStatus::Pending
                        && record.retry_count == 0;
                    if !resubmit {
                        return;
                    }
                }
            }
            self.records.insert(record.operation_id, record.clone());
        }
    }
}
