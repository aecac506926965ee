//! Derived per-collection sync status for operator displays.

use crate::conflict::ConflictStore;
use crate::connection::ConnectionRegistry;
use crate::queue::OfflineQueue;
use crate::retry::RetryLedger;
use offsync_protocol::{ConflictFilter, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Rolled-up state of one collection's outstanding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Nothing outstanding.
    Synced,
    /// Active retry work in flight.
    Syncing,
    /// Outstanding items awaiting their first attempt.
    Pending,
    /// Exhausted retries or an unresolved conflict.
    Error,
    /// Nothing outstanding and no connected session.
    Offline,
}

impl ComponentStatus {
    /// Returns the lowercase name used in listings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Syncing => "syncing",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the status display. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusIndicator {
    /// Collection the row describes.
    pub component: String,
    /// Rolled-up state.
    pub status: ComponentStatus,
    /// When the collection last saw a successful sync.
    pub last_sync_at: Option<Timestamp>,
    /// Non-synced queue items for the collection.
    pub pending_changes: usize,
    /// Populated when `status` is `Error`.
    pub error_message: Option<String>,
}

/// Borrowed views of the stores an indicator computation reads.
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    /// Queue projection.
    pub queue: &'a OfflineQueue,
    /// Retry projection.
    pub retries: &'a RetryLedger,
    /// Conflict projection.
    pub conflicts: &'a ConflictStore,
    /// Connection projection.
    pub connections: &'a ConnectionRegistry,
}

/// Computes one [`StatusIndicator`] per collection with any recorded
/// activity, recomputed from scratch on every call.
///
/// Precedence per collection: `error` beats `syncing` beats `pending`
/// beats `offline` beats `synced`.
#[must_use]
pub fn compute_indicators(inputs: StatusInputs<'_>) -> Vec<StatusIndicator> {
    let mut components: BTreeSet<String> = inputs.queue.collections().into_iter().collect();
    for record in inputs.retries.list() {
        components.insert(record.key.collection.clone());
    }
    for conflict in inputs.conflicts.list(ConflictFilter::All) {
        components.insert(conflict.key.collection.clone());
    }

    let any_connected = inputs.connections.any_connected();
    components
        .into_iter()
        .map(|component| indicator_for(&component, &inputs, any_connected))
        .collect()
}

fn indicator_for(
    component: &str,
    inputs: &StatusInputs<'_>,
    any_connected: bool,
) -> StatusIndicator {
    let pending_changes = inputs.queue.pending_count(component);
    let last_sync_at = inputs.queue.last_synced_at(component);

    let error_message = error_message_for(component, inputs);
    let status = if error_message.is_some() {
        ComponentStatus::Error
    } else if inputs.retries.has_active(component) {
        ComponentStatus::Syncing
    } else if pending_changes > 0 {
        ComponentStatus::Pending
    } else if !any_connected {
        ComponentStatus::Offline
    } else {
        ComponentStatus::Synced
    };

    StatusIndicator {
        component: component.to_string(),
        status,
        last_sync_at,
        pending_changes,
        error_message,
    }
}

fn error_message_for(component: &str, inputs: &StatusInputs<'_>) -> Option<String> {
    if inputs.retries.has_exhausted(component) {
        let detail = inputs
            .retries
            .list()
            .into_iter()
            .filter(|r| r.key.collection == component && r.status == crate::retry::RetryStatus::Exhausted)
            .filter_map(|r| r.last_error)
            .next_back();
        return Some(match detail {
            Some(detail) => format!("retries exhausted: {detail}"),
            None => "retries exhausted".to_string(),
        });
    }
    if inputs.conflicts.has_open(component) {
        return Some("unresolved conflict".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::journal::JournalRecord;
    use crate::retry::{RetryRecord, RetryStatus};
    use offsync_protocol::{
        Conflict, MutationAction, OperationId, PriorityClass, QueueItem, RecordKey, SequenceNumber,
        SyncStatus, Version,
    };

    fn item(collection: &str, sequence: u64) -> QueueItem {
        QueueItem::new(
            SequenceNumber(sequence),
            MutationAction::Update,
            RecordKey::new(collection, "r1"),
            vec![1, 2],
            Version(3),
            Timestamp(10),
        )
    }

    fn stores() -> (OfflineQueue, RetryLedger, ConflictStore, ConnectionRegistry) {
        (
            OfflineQueue::new(),
            RetryLedger::new(),
            ConflictStore::new(),
            ConnectionRegistry::new(),
        )
    }

    #[test]
    fn empty_stores_yield_no_indicators() {
        let (queue, retries, conflicts, connections) = stores();
        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert!(indicators.is_empty());
    }

    #[test]
    fn pending_work_reports_pending_with_or_without_a_connection() {
        let (mut queue, retries, conflicts, mut connections) = stores();
        queue.apply(&JournalRecord::Enqueued {
            item: item("daily_logs", 1),
        });

        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].status, ComponentStatus::Pending);
        assert_eq!(indicators[0].pending_changes, 1);

        connections.apply(&JournalRecord::ConnectionRegistered {
            connection: Connection::new("u", "d", Timestamp(0)),
        });
        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Pending);
    }

    #[test]
    fn offline_only_when_idle_and_disconnected() {
        let (mut queue, retries, conflicts, mut connections) = stores();
        let queued = item("daily_logs", 1);
        let id = queued.id;
        queue.apply(&JournalRecord::Enqueued { item: queued });
        queue.apply(&JournalRecord::QueueStatusChanged {
            id,
            status: SyncStatus::Synced,
            error: None,
            at: Timestamp(20),
        });

        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Offline);

        connections.apply(&JournalRecord::ConnectionRegistered {
            connection: Connection::new("u", "d", Timestamp(0)),
        });
        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Synced);
    }

    #[test]
    fn active_retry_means_syncing() {
        let (mut queue, mut retries, conflicts, connections) = stores();
        let queued = item("timesheets", 1);
        let id = queued.id;
        queue.apply(&JournalRecord::Enqueued { item: queued });
        retries.apply(&JournalRecord::RetryUpserted {
            record: RetryRecord {
                operation_id: id,
                key: RecordKey::new("timesheets", "r1"),
                action: MutationAction::Update,
                retry_count: 1,
                max_retries: 3,
                backoff_ms: 1_000,
                status: RetryStatus::Pending,
                last_attempt_at: Timestamp(20),
                next_retry_at: Timestamp(1_020),
                last_error: Some("timeout".into()),
            },
        });

        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Syncing);
    }

    #[test]
    fn error_outranks_everything() {
        let (mut queue, mut retries, mut conflicts, mut connections) = stores();
        let queued = item("inspections", 1);
        let id = queued.id;
        queue.apply(&JournalRecord::Enqueued { item: queued });
        connections.apply(&JournalRecord::ConnectionRegistered {
            connection: Connection::new("u", "d", Timestamp(0)),
        });
        retries.apply(&JournalRecord::RetryUpserted {
            record: RetryRecord {
                operation_id: id,
                key: RecordKey::new("inspections", "r1"),
                action: MutationAction::Update,
                retry_count: 3,
                max_retries: 3,
                backoff_ms: 4_000,
                status: RetryStatus::Exhausted,
                last_attempt_at: Timestamp(40),
                next_retry_at: Timestamp(4_040),
                last_error: Some("connection reset".into()),
            },
        });
        conflicts.apply(&JournalRecord::ConflictDetected {
            conflict: Conflict::new(
                RecordKey::new("inspections", "r2"),
                OperationId::new(),
                Version(1),
                Version(2),
                PriorityClass::High,
                Timestamp(50),
            ),
        });

        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Error);
        assert_eq!(
            indicators[0].error_message.as_deref(),
            Some("retries exhausted: connection reset")
        );
    }

    #[test]
    fn synced_once_everything_lands() {
        let (mut queue, retries, conflicts, mut connections) = stores();
        connections.apply(&JournalRecord::ConnectionRegistered {
            connection: Connection::new("u", "d", Timestamp(0)),
        });
        let queued = item("photos", 1);
        let id = queued.id;
        queue.apply(&JournalRecord::Enqueued { item: queued });
        queue.apply(&JournalRecord::QueueStatusChanged {
            id,
            status: SyncStatus::Synced,
            error: None,
            at: Timestamp(99),
        });

        let indicators = compute_indicators(StatusInputs {
            queue: &queue,
            retries: &retries,
            conflicts: &conflicts,
            connections: &connections,
        });
        assert_eq!(indicators[0].status, ComponentStatus::Synced);
        assert_eq!(indicators[0].last_sync_at, Some(Timestamp(99)));
        assert_eq!(indicators[0].pending_changes, 0);
    }
}
