//! Durable facade over the journal and its projections.

use crate::conflict::ConflictStore;
use crate::connection::{Connection, ConnectionRegistry, ConnectionStatus, HeartbeatTransition};
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::priority::PriorityTable;
use crate::queue::{OfflineQueue, QueueFilter};
use crate::retry::{RetryLedger, RetryRecord, RetryStatus};
use crate::status::{compute_indicators, StatusIndicator, StatusInputs};
use offsync_protocol::{
    Conflict, ConflictFilter, ConflictId, ConnectionId, MutationAction, OperationId, PriorityRule,
    QueueItem, RecordKey, ResolutionStrategy, SyncStatus, Timestamp, Version,
};
use offsync_storage::{FileBackend, LogBackend, MemoryBackend};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Journal file name inside the store directory.
const JOURNAL_FILE: &str = "offsync.journal";

/// Tunables for a [`SyncStore`].
#[derive(Debug, Clone)]
pub struct SyncStoreConfig {
    /// Failed attempts allowed before an operation is exhausted.
    pub max_retries: u32,
    /// Fsync the journal on every commit.
    pub sync_on_commit: bool,
    /// Collection drain-order rules.
    pub priority: PriorityTable,
}

impl Default for SyncStoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            sync_on_commit: true,
            priority: PriorityTable::default(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    queue: OfflineQueue,
    retries: RetryLedger,
    conflicts: ConflictStore,
    connections: ConnectionRegistry,
}

impl State {
    fn apply(&mut self, record: &JournalRecord) {
        self.queue.apply(record);
        self.retries.apply(record);
        self.conflicts.apply(record);
        self.connections.apply(record);
    }
}

/// Durable sync state: offline queue, retry ledger, conflict store, and
/// connection registry behind one journal.
///
/// Every mutating method appends the records for its transition and then
/// applies them to the in-memory projections, so the projections always
/// equal a replay of the journal. The journal lock serializes mutators;
/// readers take the state lock only.
pub struct SyncStore {
    journal: Mutex<Journal>,
    state: RwLock<State>,
    config: SyncStoreConfig,
}

impl SyncStore {
    /// Opens (or creates) a store under `dir`, replaying the journal.
    pub fn open(dir: impl AsRef<Path>, config: SyncStoreConfig) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(&dir.as_ref().join(JOURNAL_FILE))?;
        Self::with_backend(Box::new(backend), config)
    }

    /// Opens a store over an in-memory backend. State is lost on drop.
    pub fn open_in_memory(config: SyncStoreConfig) -> CoreResult<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), config)
    }

    fn with_backend(backend: Box<dyn LogBackend>, config: SyncStoreConfig) -> CoreResult<Self> {
        let mut journal = Journal::new(backend, config.sync_on_commit);
        let records = journal.recover()?;
        let mut state = State::default();
        for record in &records {
            state.apply(record);
        }
        info!(
            records = records.len(),
            pending = state.queue.list_pending(&QueueFilter::default()).len(),
            "sync store opened"
        );
        Ok(Self {
            journal: Mutex::new(journal),
            state: RwLock::new(state),
            config,
        })
    }

    /// Appends `records` and applies them, all under the journal lock.
    fn commit_locked(
        &self,
        journal: &mut Journal,
        records: &[JournalRecord],
    ) -> CoreResult<()> {
        for record in records {
            journal.append(record)?;
        }
        let mut state = self.state.write();
        for record in records {
            state.apply(record);
        }
        Ok(())
    }

    // ---- queue ----------------------------------------------------------

    /// Appends a local mutation to the queue. Never touches the network;
    /// the only failure mode is journal storage.
    pub fn enqueue(
        &self,
        action: MutationAction,
        key: RecordKey,
        payload: Vec<u8>,
        base_version: Version,
        now: Timestamp,
    ) -> CoreResult<QueueItem> {
        let mut journal = self.journal.lock();
        let sequence = self.state.read().queue.next_sequence();
        let item = QueueItem::new(sequence, action, key, payload, base_version, now);
        self.commit_locked(&mut journal, &[JournalRecord::Enqueued { item: item.clone() }])?;
        debug!(id = %item.id, key = %item.key, %sequence, "operation enqueued");
        Ok(item)
    }

    /// Looks up one queue item.
    pub fn get_operation(&self, id: OperationId) -> Option<QueueItem> {
        self.state.read().queue.get(id).cloned()
    }

    /// Outstanding items passing `filter`, in sequence order.
    pub fn list_pending(&self, filter: &QueueFilter) -> Vec<QueueItem> {
        self.state.read().queue.list_pending(filter)
    }

    /// Every item ever enqueued, in sequence order.
    pub fn list_operations(&self) -> Vec<QueueItem> {
        self.state.read().queue.list_all()
    }

    /// Heads of record partitions that are ready to attempt at `now`,
    /// in drain order.
    ///
    /// Only the oldest outstanding item per record is ever eligible, so
    /// same-record operations apply in enqueue order. A partition is
    /// skipped while its record has an open conflict, while its head is
    /// exhausted, and while its head's backoff deadline is in the future.
    /// Eligible heads order by priority class, then rule order, then
    /// sequence.
    pub fn ready_operations(&self, now: Timestamp) -> Vec<QueueItem> {
        let state = self.state.read();
        let mut ready: Vec<(Reverse<offsync_protocol::PriorityClass>, u32, QueueItem)> =
            Vec::new();

        for (key, items) in state.queue.partitions() {
            if state.conflicts.open_for(&key).is_some() {
                continue;
            }
            let Some(head) = items.into_iter().next() else {
                continue;
            };
            if head.status == SyncStatus::Conflict {
                continue;
            }
            if let Some(record) = state.retries.get(head.id) {
                if record.status == RetryStatus::Exhausted {
                    continue;
                }
                if record.status.is_terminal() || !record.is_due(now) {
                    continue;
                }
            }
            let (class, order) = self.config.priority.class_for(&key.collection);
            ready.push((Reverse(class), order, head));
        }

        ready.sort_by(|a, b| (a.0, a.1, a.2.sequence).cmp(&(b.0, b.1, b.2.sequence)));
        ready.into_iter().map(|(_, _, item)| item).collect()
    }

    // ---- processor outcome hooks ----------------------------------------

    /// Marks an attempt as dispatched. No-op for first attempts, which
    /// have no ledger row yet.
    pub fn record_attempt_started(&self, id: OperationId, now: Timestamp) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        let Some(mut record) = self.state.read().retries.get(id).cloned() else {
            return Ok(());
        };
        if record.status.is_terminal() {
            return Ok(());
        }
        record.status = RetryStatus::Retrying;
        record.last_attempt_at = now;
        self.commit_locked(&mut journal, &[JournalRecord::RetryUpserted { record }])
    }

    /// Marks an operation as applied remotely. Idempotent.
    pub fn record_synced(&self, id: OperationId, now: Timestamp) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        let mut records = Vec::new();
        {
            let state = self.state.read();
            let item = state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            if state.queue.would_transition(id, SyncStatus::Synced) {
                records.push(JournalRecord::QueueStatusChanged {
                    id,
                    status: SyncStatus::Synced,
                    error: None,
                    at: now,
                });
            }
            if let Some(retry) = state.retries.get(id) {
                if !retry.status.is_terminal() {
                    let mut succeeded = retry.clone();
                    succeeded.status = RetryStatus::Succeeded;
                    succeeded.last_attempt_at = now;
                    records.push(JournalRecord::RetryUpserted { record: succeeded });
                }
            }
            debug!(%id, key = %item.key, "operation synced");
        }
        self.commit_locked(&mut journal, &records)
    }

    /// Records a retryable failure, scheduling the next attempt
    /// `backoff_ms` from `now` or exhausting the operation once
    /// `max_retries` attempts have failed.
    pub fn record_transient_failure(
        &self,
        id: OperationId,
        error: &str,
        backoff_ms: u64,
        now: Timestamp,
    ) -> CoreResult<RetryRecord> {
        let mut journal = self.journal.lock();
        let record = {
            let state = self.state.read();
            let item = state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            let retry_count = state
                .retries
                .get(id)
                .map(|r| r.retry_count)
                .unwrap_or(item.retry_count)
                + 1;
            let status = if retry_count >= self.config.max_retries {
                warn!(%id, key = %item.key, retry_count, "operation exhausted");
                RetryStatus::Exhausted
            } else {
                RetryStatus::Pending
            };
            RetryRecord {
                operation_id: id,
                key: item.key.clone(),
                action: item.action,
                retry_count: retry_count.min(self.config.max_retries),
                max_retries: self.config.max_retries,
                backoff_ms,
                status,
                last_attempt_at: now,
                next_retry_at: now.saturating_add(Duration::from_millis(backoff_ms)),
                last_error: Some(error.to_string()),
            }
        };
        self.commit_locked(
            &mut journal,
            &[
                JournalRecord::QueueStatusChanged {
                    id,
                    status: SyncStatus::Failed,
                    error: Some(error.to_string()),
                    at: now,
                },
                JournalRecord::RetryUpserted {
                    record: record.clone(),
                },
            ],
        )?;
        Ok(record)
    }

    /// Records a non-retryable failure: the operation is exhausted
    /// immediately, no attempts wasted.
    pub fn record_permanent_failure(
        &self,
        id: OperationId,
        error: &str,
        now: Timestamp,
    ) -> CoreResult<RetryRecord> {
        let mut journal = self.journal.lock();
        let record = {
            let state = self.state.read();
            let item = state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            warn!(%id, key = %item.key, error, "permanent failure");
            let retry_count = state
                .retries
                .get(id)
                .map(|r| r.retry_count)
                .unwrap_or(item.retry_count);
            RetryRecord {
                operation_id: id,
                key: item.key.clone(),
                action: item.action,
                retry_count: (retry_count + 1).min(self.config.max_retries),
                max_retries: self.config.max_retries,
                backoff_ms: 0,
                status: RetryStatus::Exhausted,
                last_attempt_at: now,
                next_retry_at: now,
                last_error: Some(error.to_string()),
            }
        };
        self.commit_locked(
            &mut journal,
            &[
                JournalRecord::QueueStatusChanged {
                    id,
                    status: SyncStatus::Failed,
                    error: Some(error.to_string()),
                    at: now,
                },
                JournalRecord::RetryUpserted {
                    record: record.clone(),
                },
            ],
        )?;
        Ok(record)
    }

    /// Records a version mismatch, opening a conflict for the record
    /// unless one is already open.
    pub fn record_version_mismatch(
        &self,
        id: OperationId,
        remote_version: Version,
        now: Timestamp,
    ) -> CoreResult<Conflict> {
        let mut journal = self.journal.lock();
        let (conflict, records) = {
            let state = self.state.read();
            let item = state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            match state.conflicts.open_for(&item.key) {
                Some(open) => {
                    // One open conflict per record. Only the conflicting
                    // operation itself is marked; anything else on the key
                    // stays pending behind the open conflict.
                    let mut records = Vec::new();
                    if open.operation_id == id {
                        records.push(JournalRecord::QueueStatusChanged {
                            id,
                            status: SyncStatus::Conflict,
                            error: None,
                            at: now,
                        });
                    }
                    (open.clone(), records)
                }
                None => {
                    let mut records = vec![JournalRecord::QueueStatusChanged {
                        id,
                        status: SyncStatus::Conflict,
                        error: None,
                        at: now,
                    }];
                    let (class, _) = self.config.priority.class_for(&item.key.collection);
                    let conflict = Conflict::new(
                        item.key.clone(),
                        id,
                        item.base_version,
                        remote_version,
                        class,
                        now,
                    );
                    warn!(%id, key = %item.key, conflict = %conflict.id, "version conflict detected");
                    records.push(JournalRecord::ConflictDetected {
                        conflict: conflict.clone(),
                    });
                    (conflict, records)
                }
            }
        };
        self.commit_locked(&mut journal, &records)?;
        Ok(conflict)
    }

    // ---- retries ---------------------------------------------------------

    /// Every retry record, oldest next-attempt first.
    pub fn list_retries(&self) -> Vec<RetryRecord> {
        self.state.read().retries.list()
    }

    /// Earliest pending backoff deadline, if any.
    pub fn next_retry_deadline(&self) -> Option<Timestamp> {
        self.state.read().retries.next_deadline()
    }

    /// Cancels an operation's backoff wait so it is attempted on the
    /// next processor pass.
    pub fn force_retry(&self, id: OperationId, now: Timestamp) -> CoreResult<RetryRecord> {
        let mut journal = self.journal.lock();
        let record = {
            let state = self.state.read();
            state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            let Some(existing) = state.retries.get(id) else {
                return Err(CoreError::NotRetryable {
                    operation_id: id,
                    status: "never attempted",
                });
            };
            if existing.status.is_terminal() {
                return Err(CoreError::NotRetryable {
                    operation_id: id,
                    status: existing.status.as_str(),
                });
            }
            let mut record = existing.clone();
            record.status = RetryStatus::Pending;
            record.next_retry_at = now;
            record
        };
        self.commit_locked(
            &mut journal,
            &[JournalRecord::RetryUpserted {
                record: record.clone(),
            }],
        )?;
        Ok(record)
    }

    /// Cancels every pending backoff wait, making all retryable
    /// operations due at `now`. Returns the number of records reset.
    ///
    /// Used when connectivity returns after an outage: deadlines accrued
    /// while offline say nothing about the remote's health now.
    pub fn cancel_pending_backoffs(&self, now: Timestamp) -> CoreResult<usize> {
        let mut journal = self.journal.lock();
        let records: Vec<JournalRecord> = {
            let state = self.state.read();
            state
                .retries
                .list()
                .into_iter()
                .filter(|r| !r.status.is_terminal() && r.next_retry_at > now)
                .map(|mut record| {
                    record.status = RetryStatus::Pending;
                    record.next_retry_at = now;
                    JournalRecord::RetryUpserted { record }
                })
                .collect()
        };
        let reset = records.len();
        if reset > 0 {
            info!(reset, "pending backoff waits cancelled");
        }
        self.commit_locked(&mut journal, &records)?;
        Ok(reset)
    }

    /// Drops an exhausted operation for good. The item is retained with
    /// status `abandoned` for audit.
    pub fn abandon_operation(&self, id: OperationId, now: Timestamp) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        {
            let state = self.state.read();
            state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            if state.retries.get(id).map(|r| r.status) != Some(RetryStatus::Exhausted) {
                return Err(CoreError::NotExhausted(id));
            }
        }
        info!(%id, "operation abandoned");
        self.commit_locked(
            &mut journal,
            &[JournalRecord::QueueStatusChanged {
                id,
                status: SyncStatus::Abandoned,
                error: None,
                at: now,
            }],
        )
    }

    /// Puts an exhausted operation back in play with a fresh retry
    /// budget.
    pub fn resubmit_operation(&self, id: OperationId, now: Timestamp) -> CoreResult<QueueItem> {
        let mut journal = self.journal.lock();
        let record = {
            let state = self.state.read();
            state.queue.get(id).ok_or(CoreError::UnknownOperation(id))?;
            let Some(existing) = state.retries.get(id) else {
                return Err(CoreError::NotExhausted(id));
            };
            if existing.status != RetryStatus::Exhausted {
                return Err(CoreError::NotExhausted(id));
            }
            let mut record = existing.clone();
            record.retry_count = 0;
            record.backoff_ms = 0;
            record.status = RetryStatus::Pending;
            record.next_retry_at = now;
            record.last_error = None;
            record
        };
        info!(%id, "operation resubmitted");
        self.commit_locked(
            &mut journal,
            &[
                JournalRecord::RetryUpserted { record },
                JournalRecord::QueueStatusChanged {
                    id,
                    status: SyncStatus::Pending,
                    error: None,
                    at: now,
                },
            ],
        )?;
        self.get_operation(id).ok_or(CoreError::UnknownOperation(id))
    }

    // ---- conflicts -------------------------------------------------------

    /// Conflicts passing `filter`, newest detection first.
    pub fn list_conflicts(&self, filter: ConflictFilter) -> Vec<Conflict> {
        self.state.read().conflicts.list(filter)
    }

    /// Looks up one conflict.
    pub fn get_conflict(&self, id: ConflictId) -> Option<Conflict> {
        self.state.read().conflicts.get(id).cloned()
    }

    /// Resolves an open conflict.
    ///
    /// `local_wins` requeues the blocked operation against the remote
    /// version it lost to, keeping its sequence so later same-record
    /// operations stay behind it. `remote_wins` discards the local
    /// mutation, marking it synced. `manual` requeues with the merged
    /// payload, which is required.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
        merged_payload: Option<Vec<u8>>,
        now: Timestamp,
    ) -> CoreResult<Conflict> {
        let mut journal = self.journal.lock();
        let records = {
            let state = self.state.read();
            let conflict = state
                .conflicts
                .get(id)
                .ok_or(CoreError::UnknownConflict(id))?;
            if conflict.is_resolved() {
                return Err(CoreError::ConflictAlreadyResolved(id));
            }
            if strategy == ResolutionStrategy::Manual && merged_payload.is_none() {
                return Err(CoreError::MissingMergePayload(id));
            }
            let operation_id = conflict.operation_id;
            let mut records = vec![JournalRecord::ConflictResolved {
                id,
                strategy,
                resolved_by: resolved_by.to_string(),
                at: now,
            }];
            match strategy {
                ResolutionStrategy::LocalWins => {
                    records.push(JournalRecord::QueueRequeued {
                        id: operation_id,
                        base_version: conflict.remote_version,
                        payload: None,
                        at: now,
                    });
                }
                ResolutionStrategy::Manual => {
                    records.push(JournalRecord::QueueRequeued {
                        id: operation_id,
                        base_version: conflict.remote_version,
                        payload: merged_payload,
                        at: now,
                    });
                }
                ResolutionStrategy::RemoteWins => {
                    records.push(JournalRecord::QueueStatusChanged {
                        id: operation_id,
                        status: SyncStatus::Synced,
                        error: None,
                        at: now,
                    });
                    if let Some(retry) = state.retries.get(operation_id) {
                        if !retry.status.is_terminal() {
                            let mut succeeded = retry.clone();
                            succeeded.status = RetryStatus::Succeeded;
                            records.push(JournalRecord::RetryUpserted { record: succeeded });
                        }
                    }
                }
            }
            info!(conflict = %id, %strategy, resolved_by, "conflict resolved");
            records
        };
        self.commit_locked(&mut journal, &records)?;
        self.get_conflict(id).ok_or(CoreError::UnknownConflict(id))
    }

    // ---- connections -----------------------------------------------------

    /// Registers a fresh client session.
    pub fn register_connection(
        &self,
        user_id: &str,
        device_id: &str,
        now: Timestamp,
    ) -> CoreResult<Connection> {
        let mut journal = self.journal.lock();
        let connection = Connection::new(user_id, device_id, now);
        info!(id = %connection.id, user_id, device_id, "connection registered");
        self.commit_locked(
            &mut journal,
            &[JournalRecord::ConnectionRegistered {
                connection: connection.clone(),
            }],
        )?;
        Ok(connection)
    }

    /// Records a heartbeat for a live session.
    pub fn record_ping(
        &self,
        id: ConnectionId,
        latency_ms: u64,
        now: Timestamp,
    ) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        {
            let state = self.state.read();
            let connection = state
                .connections
                .get(id)
                .ok_or(CoreError::UnknownConnection(id))?;
            if connection.status == ConnectionStatus::Disconnected {
                return Err(CoreError::ConnectionClosed(id));
            }
        }
        self.commit_locked(
            &mut journal,
            &[JournalRecord::ConnectionPinged {
                id,
                at: now,
                latency_ms,
            }],
        )
    }

    /// Ends a session. Idempotent; the row is retained for history.
    pub fn disconnect_connection(&self, id: ConnectionId, now: Timestamp) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        {
            let state = self.state.read();
            let connection = state
                .connections
                .get(id)
                .ok_or(CoreError::UnknownConnection(id))?;
            if connection.status == ConnectionStatus::Disconnected {
                return Ok(());
            }
        }
        info!(%id, "connection disconnected");
        self.commit_locked(
            &mut journal,
            &[JournalRecord::ConnectionStatusChanged {
                id,
                status: ConnectionStatus::Disconnected,
                at: now,
            }],
        )
    }

    /// Applies heartbeat-timeout transitions and returns them.
    ///
    /// Only connection rows change; the queue is never touched.
    pub fn sweep_connections(
        &self,
        now: Timestamp,
        timeout: Duration,
        grace: Duration,
    ) -> CoreResult<Vec<HeartbeatTransition>> {
        let mut journal = self.journal.lock();
        let transitions = self.state.read().connections.overdue(now, timeout, grace);
        let records: Vec<JournalRecord> = transitions
            .iter()
            .map(|t| JournalRecord::ConnectionStatusChanged {
                id: t.id,
                status: t.status,
                at: now,
            })
            .collect();
        for t in &transitions {
            debug!(id = %t.id, status = %t.status, "heartbeat sweep transition");
        }
        self.commit_locked(&mut journal, &records)?;
        Ok(transitions)
    }

    /// Every session, most recent connection first.
    pub fn list_connections(&self) -> Vec<Connection> {
        self.state.read().connections.list()
    }

    /// Returns true if any session is currently connected.
    pub fn any_connected(&self) -> bool {
        self.state.read().connections.any_connected()
    }

    // ---- derived views ---------------------------------------------------

    /// Drain-order rules, highest table position first.
    pub fn list_priority_rules(&self) -> Vec<PriorityRule> {
        self.config.priority.rules().to_vec()
    }

    /// Per-collection status rows, recomputed on every call.
    pub fn status_indicators(&self) -> Vec<StatusIndicator> {
        let state = self.state.read();
        compute_indicators(StatusInputs {
            queue: &state.queue,
            retries: &state.retries,
            conflicts: &state.conflicts,
            connections: &state.connections,
        })
    }

    /// Failed attempts allowed before exhaustion.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
