//! Connection registry: liveness of client sessions.

use crate::journal::JournalRecord;
use offsync_protocol::{ConnectionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Liveness state of a client session.
///
/// State machine: `connected ⇄ reconnecting → disconnected`. Disconnected
/// is terminal per session row; a reconnecting device registers a new
/// connection instead of reviving the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Heartbeats arriving normally.
    Connected,
    /// Heartbeat overdue; grace period running.
    Reconnecting,
    /// Session over. Terminal.
    Disconnected,
}

impl ConnectionStatus {
    /// Returns the lowercase name used in listings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client session (per device), retained after disconnect for
/// historical display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Session id.
    pub id: ConnectionId,
    /// User the session belongs to.
    pub user_id: String,
    /// Device the session runs on.
    pub device_id: String,
    /// When the session connected.
    pub connected_at: Timestamp,
    /// When the session ended, once it has.
    pub disconnected_at: Option<Timestamp>,
    /// Current liveness state.
    pub status: ConnectionStatus,
    /// Last heartbeat arrival.
    pub last_ping_at: Timestamp,
    /// Last measured round-trip latency.
    pub latency_ms: Option<u64>,
}

impl Connection {
    /// Creates a freshly connected session.
    #[must_use]
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            connected_at: now,
            disconnected_at: None,
            status: ConnectionStatus::Connected,
            last_ping_at: now,
            latency_ms: None,
        }
    }

    /// Returns true while the session can still receive pushes.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Reconnecting
        )
    }
}

/// A heartbeat transition produced by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTransition {
    /// The connection that changed.
    pub id: ConnectionId,
    /// Its new status.
    pub status: ConnectionStatus,
}

/// In-memory projection of all sessions, past and present.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: std::collections::HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Returns every session, most recent connection first.
    #[must_use]
    pub fn list(&self) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self.connections.values().cloned().collect();
        connections.sort_by_key(|c| std::cmp::Reverse((c.connected_at, c.id)));
        connections
    }

    /// Returns true if any session is currently `Connected`.
    #[must_use]
    pub fn any_connected(&self) -> bool {
        self.connections
            .values()
            .any(|c| c.status == ConnectionStatus::Connected)
    }

    /// Finds sessions whose heartbeat is overdue at `now`.
    ///
    /// `Connected` sessions past `timeout` become `Reconnecting`;
    /// `Reconnecting` sessions past `timeout + grace` become
    /// `Disconnected`. The sweep only reports transitions; committing
    /// them to the journal is the caller's job. The queue is never
    /// touched.
    #[must_use]
    pub fn overdue(
        &self,
        now: Timestamp,
        timeout: Duration,
        grace: Duration,
    ) -> Vec<HeartbeatTransition> {
        let timeout_ms = timeout.as_millis() as u64;
        let grace_ms = grace.as_millis() as u64;

        let mut transitions = Vec::new();
        for connection in self.connections.values() {
            let silent_ms = now.millis_since(connection.last_ping_at);
            match connection.status {
                ConnectionStatus::Connected if silent_ms >= timeout_ms => {
                    transitions.push(HeartbeatTransition {
                        id: connection.id,
                        status: ConnectionStatus::Reconnecting,
                    });
                }
                ConnectionStatus::Reconnecting if silent_ms >= timeout_ms + grace_ms => {
                    transitions.push(HeartbeatTransition {
                        id: connection.id,
                        status: ConnectionStatus::Disconnected,
                    });
                }
                _ => {}
            }
        }
        transitions
    }

    /// Applies one journal record to this projection.
    pub fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::ConnectionRegistered { connection } => {
                self.connections.insert(connection.id, connection.clone());
            }
            JournalRecord::ConnectionPinged { id, at, latency_ms } => {
                let Some(connection) = self.connections.get_mut(id) else {
                    debug!(%id, "ping for unknown connection ignored");
                    return;
                };
                if connection.status == ConnectionStatus::Disconnected {
                    return;
                }
                connection.last_ping_at = *at;
                connection.latency_ms = Some(*latency_ms);
                // A ping during the grace period revives the session.
                connection.status = ConnectionStatus::Connected;
            }
            JournalRecord::ConnectionStatusChanged { id, status, at } => {
                let Some(connection) = self.connections.get_mut(id) else {
                    debug!(%id, "status change for unknown connection ignored");
                    return;
                };
                if connection.status == ConnectionStatus::Disconnected {
                    return;
                }
                connection.status = *status;
                if *status == ConnectionStatus::Disconnected {
                    connection.disconnected_at = Some(*at);
                }
            }
            _ => {}
        }
    }
}
