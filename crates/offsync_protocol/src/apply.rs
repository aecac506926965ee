//! Remote-apply request/outcome contract.

use crate::mutation::{MutationAction, QueueItem, RecordKey};
use crate::types::{OperationId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One remote-apply attempt for a queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    /// Operation being applied.
    pub operation_id: OperationId,
    /// Record the mutation touches.
    pub key: RecordKey,
    /// What the mutation does.
    pub action: MutationAction,
    /// Opaque payload blob.
    pub payload: Vec<u8>,
    /// Version the mutation was made against. The remote compares this
    /// to its current token before applying.
    pub base_version: Version,
}

impl ApplyRequest {
    /// Builds a request from a queue item.
    #[must_use]
    pub fn from_item(item: &QueueItem) -> Self {
        Self {
            operation_id: item.id,
            key: item.key.clone(),
            action: item.action,
            payload: item.payload.clone(),
            base_version: item.base_version,
        }
    }
}

/// Outcome of a remote apply that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// The mutation was applied; the record now carries `new_version`.
    Applied {
        /// Version assigned by the remote store.
        new_version: Version,
    },
    /// The remote record moved past the captured base version.
    /// Not an error: a first-class state requiring resolution.
    VersionMismatch {
        /// Current remote version, used to refresh the base on
        /// resolution.
        remote_version: Version,
    },
}

/// Failure of a remote apply that did not produce an outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or server fault; retried with backoff.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The bounded apply timeout elapsed.
    #[error("remote apply timed out")]
    Timeout,

    /// Rejected input (validation, malformed payload). Never retried.
    #[error("permanent remote failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    /// Returns true if the failure should go to the retry ledger rather
    /// than being exhausted immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}
