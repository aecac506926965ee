//! Heartbeat monitor for the connection registry.

use crate::config::HeartbeatConfig;
use crate::error::EngineResult;
use crate::notify::{PushFeed, SyncEvent};
use offsync_core::{HeartbeatTransition, SyncStore};
use offsync_protocol::Timestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Periodically sweeps the connection registry for overdue heartbeats.
///
/// Expiry only mutates connection rows; the queue is never touched.
/// Runs independently of the queue processor. Transitions are published
/// on `feed` so live clients see sessions drop.
pub struct HeartbeatMonitor {
    store: Arc<SyncStore>,
    config: HeartbeatConfig,
    feed: Arc<PushFeed>,
    wake: Notify,
    shutdown: AtomicBool,
}

impl HeartbeatMonitor {
    /// Creates a monitor over `store`, publishing transitions on `feed`.
    /// Pass the queue processor's feed to share one subscriber stream.
    pub fn new(store: Arc<SyncStore>, config: HeartbeatConfig, feed: Arc<PushFeed>) -> Self {
        Self {
            store,
            config,
            feed,
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Runs one sweep at `now` and returns the transitions it applied.
    pub fn sweep(&self, now: Timestamp) -> EngineResult<Vec<HeartbeatTransition>> {
        let transitions =
            self.store
                .sweep_connections(now, self.config.timeout, self.config.grace)?;
        for transition in &transitions {
            warn!(id = %transition.id, status = %transition.status, "heartbeat overdue");
            self.feed.emit(SyncEvent::ConnectionChanged {
                connection_id: transition.id,
                status: transition.status,
            });
        }
        Ok(transitions)
    }

    /// Asks the run loop to stop after the current sweep.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Sweeps at the configured interval until [`stop`](Self::stop).
    pub async fn run(&self) -> EngineResult<()> {
        info!("heartbeat monitor started");
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("heartbeat monitor stopped");
                return Ok(());
            }
            self.sweep(Timestamp::now())?;
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.sweep_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_core::{ConnectionStatus, SyncStoreConfig};
    use std::time::Duration;

    #[test]
    fn sweep_applies_the_state_machine() {
        let store = Arc::new(
            SyncStore::open_in_memory(SyncStoreConfig {
                sync_on_commit: false,
                ..SyncStoreConfig::default()
            })
            .unwrap(),
        );
        let feed = Arc::new(PushFeed::new());
        let events = feed.subscribe();
        let monitor = HeartbeatMonitor::new(
            Arc::clone(&store),
            HeartbeatConfig {
                sweep_interval: Duration::from_secs(1),
                timeout: Duration::from_millis(1_000),
                grace: Duration::from_millis(500),
            },
            feed,
        );
        let connection = store
            .register_connection("user-1", "tablet-7", Timestamp(0))
            .unwrap();

        assert!(monitor.sweep(Timestamp(500)).unwrap().is_empty());

        let transitions = monitor.sweep(Timestamp(1_000)).unwrap();
        assert_eq!(transitions[0].status, ConnectionStatus::Reconnecting);
        assert_eq!(
            events.recv().unwrap(),
            SyncEvent::ConnectionChanged {
                connection_id: connection.id,
                status: ConnectionStatus::Reconnecting,
            }
        );

        // A ping during the grace period revives the session.
        store
            .record_ping(connection.id, 40, Timestamp(1_200))
            .unwrap();
        assert!(monitor.sweep(Timestamp(1_900)).unwrap().is_empty());

        let transitions = monitor.sweep(Timestamp(2_200)).unwrap();
        assert_eq!(transitions[0].status, ConnectionStatus::Reconnecting);
        let transitions = monitor.sweep(Timestamp(3_000)).unwrap();
        assert_eq!(transitions[0].status, ConnectionStatus::Disconnected);
        let published: Vec<SyncEvent> = events.try_iter().collect();
        assert!(published.contains(&SyncEvent::ConnectionChanged {
            connection_id: connection.id,
            status: ConnectionStatus::Disconnected,
        }));
    }
}
