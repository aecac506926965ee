//! Push feed distributing sync state changes to live connections.

use offsync_core::ConnectionStatus;
use offsync_protocol::{ConflictId, ConnectionId, OperationId, RecordKey, SyncStatus};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// A sync state change worth pushing to connected clients.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A queue item changed status.
    OperationStatus {
        /// Operation that changed.
        operation_id: OperationId,
        /// Record it touches.
        key: RecordKey,
        /// New status.
        status: SyncStatus,
    },
    /// An operation ran out of retries.
    OperationExhausted {
        /// Operation that exhausted.
        operation_id: OperationId,
        /// Record it touches.
        key: RecordKey,
        /// Last error seen.
        error: String,
    },
    /// A version conflict was detected.
    ConflictDetected {
        /// The new conflict.
        conflict_id: ConflictId,
        /// Record in conflict.
        key: RecordKey,
    },
    /// A conflict was resolved.
    ConflictResolved {
        /// The resolved conflict.
        conflict_id: ConflictId,
        /// Record that was in conflict.
        key: RecordKey,
    },
    /// A client session changed liveness state.
    ConnectionChanged {
        /// The session.
        connection_id: ConnectionId,
        /// New status.
        status: ConnectionStatus,
    },
}

/// Distributes [`SyncEvent`]s to subscribers in emit order.
///
/// Subscribers that stop receiving are dropped on the next emit.
#[derive(Debug, Default)]
pub struct PushFeed {
    subscribers: RwLock<Vec<Sender<SyncEvent>>>,
}

impl PushFeed {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits one event to every live subscriber.
    pub fn emit(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last emit.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
