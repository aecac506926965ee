//! End-to-end scenarios: enqueue through remote apply, retry, conflict
//! resolution, and restart recovery.

use offsync_core::{CoreError, RetryStatus, SyncStore, SyncStoreConfig};
use offsync_engine::{
    EngineConfig, EngineError, HeartbeatConfig, HeartbeatMonitor, MockRemote, PushFeed,
    QueueProcessor, RemoteStore, RetryConfig,
};
use offsync_protocol::{
    ApplyOutcome, ConflictFilter, MutationAction, QueueItem, RecordKey, RemoteError,
    ResolutionStrategy, SyncStatus, Timestamp, Version,
};
use std::sync::Arc;
use std::time::Duration;

fn open_store() -> Arc<SyncStore> {
    Arc::new(
        SyncStore::open_in_memory(SyncStoreConfig {
            sync_on_commit: false,
            ..SyncStoreConfig::default()
        })
        .unwrap(),
    )
}

fn processor(store: &Arc<SyncStore>, remote: &Arc<MockRemote>) -> QueueProcessor {
    let config = EngineConfig::new().with_retry(RetryConfig {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        add_jitter: false,
    });
    QueueProcessor::new(
        Arc::clone(store),
        Arc::clone(remote) as Arc<dyn RemoteStore>,
        config,
    )
}

fn enqueue(store: &SyncStore, collection: &str, record: &str, at: u64) -> QueueItem {
    store
        .enqueue(
            MutationAction::Update,
            RecordKey::new(collection, record),
            vec![1, 2],
            Version(1),
            Timestamp(at),
        )
        .unwrap()
}

#[tokio::test]
async fn queue_drains_in_priority_order() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());

    let photo = enqueue(&store, "photos", "p1", 1);
    let timesheet = enqueue(&store, "timesheets", "t1", 2);
    let incident = enqueue(&store, "safety_incidents", "s1", 3);
    let log = enqueue(&store, "daily_logs", "l1", 4);

    // Concurrency of one serializes the dispatch so call order is
    // observable on the mock.
    let single = QueueProcessor::new(
        Arc::clone(&store),
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        EngineConfig::new().with_concurrency(1),
    );
    single.tick(Timestamp(10)).await.unwrap();

    let calls: Vec<RecordKey> = remote.requests().iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        calls,
        vec![
            incident.key.clone(),
            log.key.clone(),
            timesheet.key.clone(),
            photo.key.clone(),
        ]
    );
    for item in [photo, timesheet, incident, log] {
        assert_eq!(
            store.get_operation(item.id).unwrap().status,
            SyncStatus::Synced
        );
    }
}

#[tokio::test]
async fn same_record_operations_apply_in_enqueue_order() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    let key = RecordKey::new("daily_logs", "d1");

    let first = enqueue(&store, "daily_logs", "d1", 1);
    let second = enqueue(&store, "daily_logs", "d1", 2);
    let third = enqueue(&store, "daily_logs", "d1", 3);

    // The first attempt fails transiently; the later operations must
    // wait behind it rather than overtaking.
    remote.script(key.clone(), Err(RemoteError::Transient("503".into())));

    processor.tick(Timestamp(10)).await.unwrap();
    processor.tick(Timestamp(50)).await.unwrap();
    processor.tick(Timestamp(110)).await.unwrap();
    processor.tick(Timestamp(120)).await.unwrap();
    processor.tick(Timestamp(130)).await.unwrap();

    let applied: Vec<_> = remote
        .requests_for(&key)
        .iter()
        .map(|r| r.operation_id)
        .collect();
    assert_eq!(applied, vec![first.id, first.id, second.id, third.id]);
    for item in [first, second, third] {
        assert_eq!(
            store.get_operation(item.id).unwrap().status,
            SyncStatus::Synced
        );
    }
}

#[tokio::test]
async fn exhaustion_is_terminal_until_resubmitted() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    let key = RecordKey::new("inspections", "i1");
    let item = enqueue(&store, "inspections", "i1", 1);

    for _ in 0..3 {
        remote.script(key.clone(), Err(RemoteError::Transient("503".into())));
    }
    let mut now = 10;
    for _ in 0..3 {
        processor.tick(Timestamp(now)).await.unwrap();
        now += 10_000;
    }

    let retry = store.list_retries().into_iter().next().unwrap();
    assert_eq!(retry.status, RetryStatus::Exhausted);
    assert_eq!(retry.retry_count, 3);
    assert_eq!(remote.requests_for(&key).len(), 3);

    // No further automatic attempts, and manual retry is rejected.
    assert_eq!(processor.tick(Timestamp(now)).await.unwrap(), 0);
    assert!(matches!(
        processor.retry_now(item.id, Timestamp(now)),
        Err(EngineError::Store(CoreError::NotRetryable { .. }))
    ));

    // Resubmit grants a fresh budget and the operation drains.
    store.resubmit_operation(item.id, Timestamp(now)).unwrap();
    assert_eq!(processor.tick(Timestamp(now)).await.unwrap(), 1);
    assert_eq!(
        store.get_operation(item.id).unwrap().status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn conflict_detection_and_local_wins_resolution() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    let key = RecordKey::new("daily_logs", "d1");
    let item = enqueue(&store, "daily_logs", "d1", 1);

    remote.script(
        key.clone(),
        Ok(ApplyOutcome::VersionMismatch {
            remote_version: Version(7),
        }),
    );

    processor.tick(Timestamp(10)).await.unwrap();
    let conflict = store
        .list_conflicts(ConflictFilter::Unresolved)
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(conflict.operation_id, item.id);
    assert_eq!(conflict.remote_version, Version(7));

    // The partition stays blocked while the conflict is open.
    assert_eq!(processor.tick(Timestamp(20)).await.unwrap(), 0);

    store
        .resolve_conflict(
            conflict.id,
            ResolutionStrategy::LocalWins,
            "foreman",
            None,
            Timestamp(30),
        )
        .unwrap();

    // Requeued against the remote version it lost to.
    processor.tick(Timestamp(40)).await.unwrap();
    let reapplied = remote.requests_for(&key);
    assert_eq!(reapplied.last().unwrap().base_version, Version(7));
    assert_eq!(
        store.get_operation(item.id).unwrap().status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn remote_wins_leaves_nothing_outstanding() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    let key = RecordKey::new("daily_logs", "d1");
    let item = enqueue(&store, "daily_logs", "d1", 1);

    remote.script(
        key,
        Ok(ApplyOutcome::VersionMismatch {
            remote_version: Version(7),
        }),
    );
    processor.tick(Timestamp(10)).await.unwrap();

    let conflict = store
        .list_conflicts(ConflictFilter::Unresolved)
        .into_iter()
        .next()
        .unwrap();
    store
        .resolve_conflict(
            conflict.id,
            ResolutionStrategy::RemoteWins,
            "foreman",
            None,
            Timestamp(20),
        )
        .unwrap();

    assert_eq!(
        store.get_operation(item.id).unwrap().status,
        SyncStatus::Synced
    );
    assert!(store
        .list_pending(&offsync_core::QueueFilter::default())
        .is_empty());
    assert_eq!(processor.tick(Timestamp(30)).await.unwrap(), 0);
}

#[tokio::test]
async fn heartbeat_expiry_never_touches_the_queue() {
    let store = open_store();
    let monitor = HeartbeatMonitor::new(
        Arc::clone(&store),
        HeartbeatConfig {
            sweep_interval: Duration::from_secs(1),
            timeout: Duration::from_millis(1_000),
            grace: Duration::from_millis(500),
        },
        Arc::new(PushFeed::new()),
    );
    let item = enqueue(&store, "daily_logs", "d1", 1);
    store
        .register_connection("user-1", "tablet-7", Timestamp(0))
        .unwrap();

    monitor.sweep(Timestamp(1_000)).unwrap();
    monitor.sweep(Timestamp(2_000)).unwrap();
    assert!(!store.any_connected());
    assert_eq!(
        store.get_operation(item.id).unwrap().status,
        SyncStatus::Pending
    );

    // Queue work still drains while offline.
    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    processor.tick(Timestamp(3_000)).await.unwrap();
    assert_eq!(
        store.get_operation(item.id).unwrap().status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn duplicate_outcomes_are_harmless() {
    let store = open_store();
    let item = enqueue(&store, "daily_logs", "d1", 1);

    store.record_synced(item.id, Timestamp(10)).unwrap();
    store.record_synced(item.id, Timestamp(20)).unwrap();

    let synced = store.get_operation(item.id).unwrap();
    assert_eq!(synced.status, SyncStatus::Synced);
    // The first sync timestamp stands.
    assert_eq!(
        store.status_indicators()[0].last_sync_at,
        Some(Timestamp(10))
    );
}

#[tokio::test]
async fn retry_schedule_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = RecordKey::new("daily_logs", "d1");
    let id;
    {
        let store = Arc::new(SyncStore::open(dir.path(), SyncStoreConfig::default()).unwrap());
        let remote = Arc::new(MockRemote::new());
        let processor = processor(&store, &remote);
        id = enqueue(&store, "daily_logs", "d1", 1).id;
        remote.script(key.clone(), Err(RemoteError::Transient("offline".into())));
        processor.tick(Timestamp(10)).await.unwrap();
    }

    let store = Arc::new(SyncStore::open(dir.path(), SyncStoreConfig::default()).unwrap());
    let retry = store.list_retries().into_iter().next().unwrap();
    assert_eq!(retry.operation_id, id);
    assert_eq!(retry.retry_count, 1);
    assert_eq!(retry.next_retry_at, Timestamp(110));

    let remote = Arc::new(MockRemote::new());
    let processor = processor(&store, &remote);
    assert_eq!(processor.tick(Timestamp(50)).await.unwrap(), 0);
    assert_eq!(processor.tick(Timestamp(110)).await.unwrap(), 1);
    assert_eq!(
        store.get_operation(id).unwrap().status,
        SyncStatus::Synced
    );
}
