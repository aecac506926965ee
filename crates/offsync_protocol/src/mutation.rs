//! Mutation envelopes and queue item rows.

use crate::error::ProtocolError;
use crate::types::{OperationId, SequenceNumber, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a queued mutation does to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Create a new record.
    Create,
    /// Update an existing record.
    Update,
    /// Delete a record.
    Delete,
}

impl MutationAction {
    /// Returns the lowercase name used in listings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

/// Partition key for causal ordering: operations sharing a key apply in
/// FIFO order, operations on different keys are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Collection name (opaque to the engine).
    pub collection: String,
    /// Record identifier within the collection.
    pub record_id: String,
}

impl RecordKey {
    /// Creates a record key.
    pub fn new(collection: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.record_id)
    }
}

/// Sync status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Awaiting remote application.
    Pending,
    /// Applied remotely (or discarded by an explicit resolution).
    Synced,
    /// Last attempt failed; retry state lives in the retry ledger.
    Failed,
    /// Blocked behind an unresolved version conflict.
    Conflict,
    /// Dropped by an operator after retry exhaustion.
    Abandoned,
}

impl SyncStatus {
    /// Returns the lowercase name used in listings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
            Self::Abandoned => "abandoned",
        }
    }

    /// Synced and abandoned items never transition again; every other
    /// status can.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Abandoned)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// One pending local mutation awaiting remote application.
///
/// The payload is an opaque serialized blob; the typed envelope around it
/// (key, action, base version) is everything the engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Opaque handle for this operation.
    pub id: OperationId,
    /// Causal-order key assigned at enqueue time.
    pub sequence: SequenceNumber,
    /// What the mutation does.
    pub action: MutationAction,
    /// Which record it touches.
    pub key: RecordKey,
    /// Opaque serialized payload.
    #[serde(with = "serde_bytes_vec")]
    pub payload: Vec<u8>,
    /// Record version observed when the mutation was made locally.
    pub base_version: Version,
    /// When the mutation was enqueued.
    pub created_at: Timestamp,
    /// Current sync status.
    pub status: SyncStatus,
    /// Failed attempts so far (mirrors the retry ledger for display).
    pub retry_count: u32,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Creates a fresh pending item.
    #[must_use]
    pub fn new(
        sequence: SequenceNumber,
        action: MutationAction,
        key: RecordKey,
        payload: Vec<u8>,
        base_version: Version,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: OperationId::new(),
            sequence,
            action,
            key,
            payload,
            base_version,
            created_at,
            status: SyncStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Returns true if this item still needs remote application.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// CBOR-friendly byte-vector serialization.
///
/// ciborium encodes `Vec<u8>` as an integer array by default; forcing the
/// bytes type keeps payload framing compact and unambiguous.
mod serde_bytes_vec {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = ciborium::Value::deserialize(deserializer)?;
        match value {
            ciborium::Value::Bytes(bytes) => Ok(bytes),
            ciborium::Value::Array(items) => items
                .into_iter()
                .map(|v| {
                    v.as_integer()
                        .and_then(|i| u8::try_from(i).ok())
                        .ok_or_else(|| D::Error::custom("payload array holds non-byte values"))
                })
                .collect(),
            _ => Err(D::Error::custom("payload must be a byte string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_roundtrip() {
        for action in [
            MutationAction::Create,
            MutationAction::Update,
            MutationAction::Delete,
        ] {
            assert_eq!(action.as_str().parse::<MutationAction>().unwrap(), action);
        }
        assert!("upsert".parse::<MutationAction>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(SyncStatus::Synced.is_terminal());
        assert!(SyncStatus::Abandoned.is_terminal());
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::Conflict.is_terminal());
    }

    #[test]
    fn new_item_is_pending() {
        let item = QueueItem::new(
            SequenceNumber(1),
            MutationAction::Create,
            RecordKey::new("jobs", "job-1"),
            vec![1, 2, 3],
            Version::INITIAL,
            Timestamp(0),
        );

        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.is_outstanding());
        assert!(item.last_error.is_none());
    }

    #[test]
    fn record_key_display() {
        let key = RecordKey::new("invoices", "inv-9");
        assert_eq!(key.to_string(), "invoices/inv-9");
    }
}
