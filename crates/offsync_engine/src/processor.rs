//! Background queue processor.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::notify::{PushFeed, SyncEvent};
use crate::remote::RemoteStore;
use offsync_core::{RetryRecord, RetryStatus, SyncStore};
use offsync_protocol::{
    ApplyOutcome, ApplyRequest, Conflict, ConflictId, OperationId, RecordKey, RemoteError,
    ResolutionStrategy, SyncStatus, Timestamp,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Counters for one processor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Processor passes over the queue.
    pub ticks: u64,
    /// Remote apply calls dispatched.
    pub attempts: u64,
    /// Operations applied remotely.
    pub synced: u64,
    /// Retryable failures recorded.
    pub transient_failures: u64,
    /// Version conflicts detected.
    pub conflicts: u64,
    /// Operations exhausted (retry budget spent or permanent failure).
    pub exhausted: u64,
}

/// Drains the offline queue against a [`RemoteStore`].
///
/// One processor runs per client process. Each tick selects the eligible
/// partition heads, dispatches them to a bounded worker pool, and routes
/// every outcome back into the store. Same-record operations never run
/// concurrently: only partition heads are selected and a key stays
/// marked in-flight until its outcome is committed.
pub struct QueueProcessor {
    store: Arc<SyncStore>,
    remote: Arc<dyn RemoteStore>,
    config: EngineConfig,
    feed: Arc<PushFeed>,
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<HashSet<RecordKey>>,
    wake: Notify,
    shutdown: AtomicBool,
    stats: Mutex<ProcessorStats>,
}

impl QueueProcessor {
    /// Creates a processor over `store` and `remote`.
    pub fn new(store: Arc<SyncStore>, remote: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        let concurrency = config.concurrency;
        Self {
            store,
            remote,
            config,
            feed: Arc::new(PushFeed::new()),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            in_flight: Mutex::new(HashSet::new()),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
            stats: Mutex::new(ProcessorStats::default()),
        }
    }

    /// The feed live connections subscribe to.
    pub fn feed(&self) -> Arc<PushFeed> {
        Arc::clone(&self.feed)
    }

    /// Counters so far.
    pub fn stats(&self) -> ProcessorStats {
        *self.stats.lock()
    }

    /// Wakes the run loop early, cancelling any idle or backoff wait.
    /// Called after enqueue and on demand.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Cancels an operation's backoff and wakes the loop so it is
    /// attempted immediately.
    pub fn retry_now(&self, id: OperationId, now: Timestamp) -> EngineResult<RetryRecord> {
        let record = self.store.force_retry(id, now)?;
        info!(%id, "manual retry requested");
        self.wake();
        Ok(record)
    }

    /// Resolves an open conflict, publishes the resolution, and wakes
    /// the loop since the record's partition may now have eligible work.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
        merged_payload: Option<Vec<u8>>,
        now: Timestamp,
    ) -> EngineResult<Conflict> {
        let conflict = self
            .store
            .resolve_conflict(id, strategy, resolved_by, merged_payload, now)?;
        self.feed.emit(SyncEvent::ConflictResolved {
            conflict_id: conflict.id,
            key: conflict.key.clone(),
        });
        self.wake();
        Ok(conflict)
    }

    /// Triggers an immediate full-queue sweep after an outage ends.
    ///
    /// Backoff deadlines accrued while offline are cancelled first, so
    /// the sweep attempts every retryable operation instead of waiting
    /// out delays that measured nothing but the outage itself.
    pub fn connectivity_restored(&self, now: Timestamp) -> EngineResult<usize> {
        let reset = self.store.cancel_pending_backoffs(now)?;
        info!(reset, "connectivity restored, sweeping the queue");
        self.wake();
        Ok(reset)
    }

    /// Asks the run loop to stop after the current tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake();
    }

    /// Runs one pass: dispatches every eligible head to the worker pool
    /// and routes the outcomes. Returns the number of attempts made.
    pub async fn tick(&self, now: Timestamp) -> EngineResult<usize> {
        self.stats.lock().ticks += 1;

        let batch: Vec<ApplyRequest> = {
            let in_flight = self.in_flight.lock();
            self.store
                .ready_operations(now)
                .iter()
                .filter(|item| !in_flight.contains(&item.key))
                .map(ApplyRequest::from_item)
                .collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }
        debug!(batch = batch.len(), "dispatching eligible operations");

        let batch_keys: Vec<RecordKey> = batch.iter().map(|r| r.key.clone()).collect();
        let mut join_set: JoinSet<(OperationId, RecordKey, Result<ApplyOutcome, RemoteError>)> =
            JoinSet::new();
        for request in batch {
            self.in_flight.lock().insert(request.key.clone());
            let store = Arc::clone(&self.store);
            let remote = Arc::clone(&self.remote);
            let semaphore = Arc::clone(&self.semaphore);
            let timeout = self.config.apply_timeout;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let id = request.operation_id;
                let key = request.key.clone();
                if let Err(e) = store.record_attempt_started(id, now) {
                    return (id, key, Err(RemoteError::Transient(e.to_string())));
                }
                let outcome = match tokio::time::timeout(timeout, remote.apply(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RemoteError::Timeout),
                };
                (id, key, outcome)
            });
        }

        let mut attempts = 0;
        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, key, outcome)) => {
                    attempts += 1;
                    self.in_flight.lock().remove(&key);
                    if let Err(e) = self.route_outcome(id, &key, outcome, now) {
                        error!(%id, error = %e, "failed to commit apply outcome");
                        first_error.get_or_insert(e);
                    }
                }
                Err(join_error) => {
                    // The worker never reported its key; the batch-wide
                    // release below puts the item back in play next tick.
                    error!(error = %join_error, "apply worker panicked");
                }
            }
        }
        // Release the whole batch so a panicked or failed worker never
        // leaves its partition marked in-flight forever.
        {
            let mut in_flight = self.in_flight.lock();
            for key in &batch_keys {
                in_flight.remove(key);
            }
        }
        self.stats.lock().attempts += attempts as u64;
        match first_error {
            Some(e) => Err(e),
            None => Ok(attempts),
        }
    }

    fn route_outcome(
        &self,
        id: OperationId,
        key: &RecordKey,
        outcome: Result<ApplyOutcome, RemoteError>,
        now: Timestamp,
    ) -> EngineResult<()> {
        match outcome {
            Ok(ApplyOutcome::Applied { new_version }) => {
                self.store.record_synced(id, now)?;
                self.stats.lock().synced += 1;
                debug!(%id, key = %key, version = new_version.0, "applied remotely");
                self.feed.emit(SyncEvent::OperationStatus {
                    operation_id: id,
                    key: key.clone(),
                    status: SyncStatus::Synced,
                });
            }
            Ok(ApplyOutcome::VersionMismatch { remote_version }) => {
                let conflict = self.store.record_version_mismatch(id, remote_version, now)?;
                self.stats.lock().conflicts += 1;
                self.feed.emit(SyncEvent::ConflictDetected {
                    conflict_id: conflict.id,
                    key: key.clone(),
                });
            }
            Err(remote_error) if remote_error.is_retryable() => {
                let next_attempt = self
                    .store
                    .get_operation(id)
                    .map(|item| item.retry_count + 1)
                    .unwrap_or(1);
                let backoff_ms = self.config.retry.backoff_ms(next_attempt);
                let record = self.store.record_transient_failure(
                    id,
                    &remote_error.to_string(),
                    backoff_ms,
                    now,
                )?;
                if record.status == RetryStatus::Exhausted {
                    self.stats.lock().exhausted += 1;
                    self.feed.emit(SyncEvent::OperationExhausted {
                        operation_id: id,
                        key: key.clone(),
                        error: remote_error.to_string(),
                    });
                } else {
                    self.stats.lock().transient_failures += 1;
                    warn!(
                        %id,
                        key = %key,
                        retry_count = record.retry_count,
                        backoff_ms,
                        "transient failure, backing off"
                    );
                    self.feed.emit(SyncEvent::OperationStatus {
                        operation_id: id,
                        key: key.clone(),
                        status: SyncStatus::Failed,
                    });
                }
            }
            Err(remote_error) => {
                self.store
                    .record_permanent_failure(id, &remote_error.to_string(), now)?;
                self.stats.lock().exhausted += 1;
                self.feed.emit(SyncEvent::OperationExhausted {
                    operation_id: id,
                    key: key.clone(),
                    error: remote_error.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Runs until [`stop`](Self::stop) is called.
    ///
    /// Backoff waits are realized as bounded sleeps, not blocking
    /// waits: the loop wakes at the earliest retry deadline, at the
    /// tick interval, or immediately when woken.
    pub async fn run(&self) -> EngineResult<()> {
        info!("queue processor started");
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("queue processor stopped");
                return Ok(());
            }
            let attempted = self.tick(Timestamp::now()).await?;
            if attempted > 0 {
                // Keep draining while work is flowing.
                continue;
            }
            let wait = self.idle_wait();
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn idle_wait(&self) -> Duration {
        let tick = self.config.tick_interval;
        match self.store.next_retry_deadline() {
            Some(deadline) => {
                let until = deadline.millis_since(Timestamp::now());
                tick.min(Duration::from_millis(until))
            }
            None => tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::remote::MockRemote;
    use offsync_core::SyncStoreConfig;
    use offsync_protocol::{MutationAction, Version};

    fn fixture() -> (Arc<SyncStore>, Arc<MockRemote>, QueueProcessor) {
        let store = Arc::new(
            SyncStore::open_in_memory(SyncStoreConfig {
                sync_on_commit: false,
                ..SyncStoreConfig::default()
            })
            .unwrap(),
        );
        let remote = Arc::new(MockRemote::new());
        let config = EngineConfig::new().with_retry(RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            add_jitter: false,
        });
        let processor = QueueProcessor::new(
            Arc::clone(&store),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            config,
        );
        (store, remote, processor)
    }

    fn enqueue(store: &SyncStore, collection: &str, record: &str) -> OperationId {
        store
            .enqueue(
                MutationAction::Update,
                RecordKey::new(collection, record),
                vec![1],
                Version(1),
                Timestamp(0),
            )
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn tick_drains_and_marks_synced() {
        let (store, _remote, processor) = fixture();
        let id = enqueue(&store, "daily_logs", "d1");

        let attempts = processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
        assert_eq!(processor.stats().synced, 1);
    }

    #[tokio::test]
    async fn transient_failure_schedules_and_respects_backoff() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("daily_logs", "d1");
        let id = enqueue(&store, "daily_logs", "d1");
        remote.script(key.clone(), Err(RemoteError::Transient("503".into())));

        processor.tick(Timestamp(10)).await.unwrap();
        let retry = store.list_retries().into_iter().next().unwrap();
        assert_eq!(retry.operation_id, id);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.next_retry_at, Timestamp(110));

        // Before the deadline nothing is attempted.
        assert_eq!(processor.tick(Timestamp(50)).await.unwrap(), 0);
        // After it the operation goes out again and succeeds.
        assert_eq!(processor.tick(Timestamp(110)).await.unwrap(), 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
        assert_eq!(remote.requests_for(&key).len(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_exhausts_without_retrying() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("inspections", "i1");
        let id = enqueue(&store, "inspections", "i1");
        remote.script(key.clone(), Err(RemoteError::Permanent("422".into())));

        processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(processor.tick(Timestamp(100_000)).await.unwrap(), 0);
        assert_eq!(remote.requests_for(&key).len(), 1);
        assert_eq!(
            store.list_retries().into_iter().next().unwrap().status,
            RetryStatus::Exhausted
        );
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Failed
        );
        assert_eq!(processor.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn version_mismatch_opens_conflict_and_blocks_partition() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("daily_logs", "d1");
        let id = enqueue(&store, "daily_logs", "d1");
        remote.script(
            key.clone(),
            Ok(ApplyOutcome::VersionMismatch {
                remote_version: Version(7),
            }),
        );

        processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Conflict
        );
        assert_eq!(processor.stats().conflicts, 1);
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retry_now_cancels_the_backoff_wait() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("daily_logs", "d1");
        let id = enqueue(&store, "daily_logs", "d1");
        remote.script(key, Err(RemoteError::Transient("503".into())));

        processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 0);

        processor.retry_now(id, Timestamp(20)).unwrap();
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn worker_panic_releases_the_partition() {
        use async_trait::async_trait;
        use offsync_protocol::ApplyRequest;
        use std::sync::atomic::AtomicBool;

        struct CrashOnFirstCall {
            crashed: AtomicBool,
        }

        #[async_trait]
        impl RemoteStore for CrashOnFirstCall {
            async fn apply(
                &self,
                request: &ApplyRequest,
            ) -> Result<ApplyOutcome, RemoteError> {
                if !self.crashed.swap(true, Ordering::SeqCst) {
                    panic!("worker crashed mid-apply");
                }
                Ok(ApplyOutcome::Applied {
                    new_version: Version(request.base_version.0 + 1),
                })
            }
        }

        let store = Arc::new(
            SyncStore::open_in_memory(SyncStoreConfig {
                sync_on_commit: false,
                ..SyncStoreConfig::default()
            })
            .unwrap(),
        );
        let remote = Arc::new(CrashOnFirstCall {
            crashed: AtomicBool::new(false),
        });
        let processor = QueueProcessor::new(
            Arc::clone(&store),
            remote as Arc<dyn RemoteStore>,
            EngineConfig::new(),
        );
        let id = enqueue(&store, "daily_logs", "d1");

        // The crashed worker reports nothing; the key must still be
        // released so the partition stays live.
        processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn connectivity_restored_cancels_outage_backoffs() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("daily_logs", "d1");
        let id = enqueue(&store, "daily_logs", "d1");
        remote.script(key, Err(RemoteError::Transient("offline".into())));

        // One failure during the outage leaves a long backoff behind.
        processor.tick(Timestamp(10)).await.unwrap();
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 0);

        let reset = processor.connectivity_restored(Timestamp(20)).unwrap();
        assert_eq!(reset, 1);
        assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn resolution_publishes_and_reopens_the_partition() {
        let (store, remote, processor) = fixture();
        let key = RecordKey::new("daily_logs", "d1");
        let id = enqueue(&store, "daily_logs", "d1");
        remote.script(
            key.clone(),
            Ok(ApplyOutcome::VersionMismatch {
                remote_version: Version(7),
            }),
        );
        let events = processor.feed().subscribe();

        processor.tick(Timestamp(10)).await.unwrap();
        let conflict_id = match events.recv().unwrap() {
            SyncEvent::ConflictDetected { conflict_id, .. } => conflict_id,
            other => panic!("unexpected event {other:?}"),
        };

        processor
            .resolve_conflict(
                conflict_id,
                ResolutionStrategy::LocalWins,
                "foreman",
                None,
                Timestamp(20),
            )
            .unwrap();
        assert_eq!(
            events.recv().unwrap(),
            SyncEvent::ConflictResolved {
                conflict_id,
                key: key.clone(),
            }
        );

        // The requeued mutation goes out against the refreshed base.
        assert_eq!(processor.tick(Timestamp(30)).await.unwrap(), 1);
        assert_eq!(
            store.get_operation(id).unwrap().status,
            SyncStatus::Synced
        );
        assert_eq!(remote.requests_for(&key)[1].base_version, Version(7));
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (store, _remote, processor) = fixture();
        let feed = processor.feed();
        let rx = feed.subscribe();
        enqueue(&store, "daily_logs", "d1");

        processor.tick(Timestamp(10)).await.unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            SyncEvent::OperationStatus {
                status: SyncStatus::Synced,
                ..
            }
        ));
    }
}
