//! Offline queue of pending mutations.

use crate::journal::JournalRecord;
use offsync_protocol::{OperationId, QueueItem, RecordKey, SequenceNumber, SyncStatus, Timestamp};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Filter for queue listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    /// Restrict to one collection.
    pub collection: Option<String>,
    /// Restrict to one status.
    pub status: Option<SyncStatus>,
}

impl QueueFilter {
    /// Returns true if the item passes this filter.
    #[must_use]
    pub fn matches(&self, item: &QueueItem) -> bool {
        if let Some(collection) = &self.collection {
            if &item.key.collection != collection {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        true
    }
}

/// In-memory projection of the queue: one row per enqueued mutation,
/// ordered by sequence number.
///
/// Rows are retained after they reach a terminal status (audit trail); listings
/// exclude them by default. All mutation goes through
/// [`apply`](OfflineQueue::apply) so live commits and journal replay take
/// the same path.
#[derive(Debug)]
pub struct OfflineQueue {
    items: HashMap<OperationId, QueueItem>,
    order: BTreeMap<SequenceNumber, OperationId>,
    next_sequence: SequenceNumber,
    last_synced: HashMap<String, Timestamp>,
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: SequenceNumber(1),
            last_synced: HashMap::new(),
        }
    }

    /// The sequence number the next enqueue will be assigned.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.next_sequence
    }

    /// Looks up one item.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&QueueItem> {
        self.items.get(&id)
    }

    /// Returns outstanding (non-synced) items in sequence order, filtered.
    #[must_use]
    pub fn list_pending(&self, filter: &QueueFilter) -> Vec<QueueItem> {
        self.order
            .values()
            .filter_map(|id| self.items.get(id))
            .filter(|item| item.is_outstanding() && filter.matches(item))
            .cloned()
            .collect()
    }

    /// Returns every item, synced included, in sequence order.
    #[must_use]
    pub fn list_all(&self) -> Vec<QueueItem> {
        self.order
            .values()
            .filter_map(|id| self.items.get(id))
            .cloned()
            .collect()
    }

    /// Returns outstanding items grouped into per-record FIFO partitions.
    ///
    /// Within each partition the first element is the head: the only item
    /// eligible for a remote attempt.
    #[must_use]
    pub fn partitions(&self) -> HashMap<RecordKey, Vec<QueueItem>> {
        let mut partitions: HashMap<RecordKey, Vec<QueueItem>> = HashMap::new();
        for id in self.order.values() {
            if let Some(item) = self.items.get(id) {
                if item.is_outstanding() {
                    partitions.entry(item.key.clone()).or_default().push(item.clone());
                }
            }
        }
        partitions
    }

    /// Number of outstanding items for a collection.
    #[must_use]
    pub fn pending_count(&self, collection: &str) -> usize {
        self.items
            .values()
            .filter(|item| item.is_outstanding() && item.key.collection == collection)
            .count()
    }

    /// Collections that have (or had) queued items.
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .items
            .values()
            .map(|item| item.key.collection.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Last time an item for `collection` reached `Synced`.
    #[must_use]
    pub fn last_synced_at(&self, collection: &str) -> Option<Timestamp> {
        self.last_synced.get(collection).copied()
    }

    /// Returns true if committing `status` for `id` would change state.
    ///
    /// Terminal items never transition, and same-status transitions are
    /// no-ops; both tolerate duplicate processor ticks.
    #[must_use]
    pub fn would_transition(&self, id: OperationId, status: SyncStatus) -> bool {
        match self.items.get(&id) {
            Some(item) => !item.status.is_terminal() && item.status != status,
            None => false,
        }
    }

    /// Applies one journal record to this projection.
    pub fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Enqueued { item } => {
                self.order.insert(item.sequence, item.id);
                if item.sequence >= self.next_sequence {
                    self.next_sequence = item.sequence.next();
                }
                self.items.insert(item.id, item.clone());
            }
            JournalRecord::QueueStatusChanged {
                id,
                status,
                error,
                at,
            } => {
                let Some(item) = self.items.get_mut(id) else {
                    debug!(%id, "status change for unknown queue item ignored");
                    return;
                };
                if item.status.is_terminal() {
                    return;
                }
                item.status = *status;
                if let Some(message) = error {
                    item.last_error = Some(message.clone());
                }
                if *status == SyncStatus::Synced {
                    let entry = self
                        .last_synced
                        .entry(item.key.collection.clone())
                        .or_insert(*at);
                    if *at > *entry {
                        *entry = *at;
                    }
                }
            }
            JournalRecord::QueueRequeued {
                id,
                base_version,
                payload,
                ..
            } => {
                let Some(item) = self.items.get_mut(id) else {
                    debug!(%id, "requeue for unknown queue item ignored");
                    return;
                };
                if item.status.is_terminal() {
                    return;
                }
                item.base_version = *base_version;
                if let Some(merged) = payload {
                    item.payload = merged.clone();
                }
                item.status = SyncStatus::Pending;
                item.last_error = None;
            }
            JournalRecord::RetryUpserted { record } => {
                // Mirror the ledger's attempt count for display.
                if let Some(item) = self.items.get_mut(&record.operation_id) {
                    item.retry_count = record.retry_count;
                }
            }
            _ => {}
        }
    }
}
