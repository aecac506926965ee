//! # offsync Core
//!
//! Durable local state for the offsync engine:
//!
//! - Offline queue of pending mutations
//! - Retry ledger (attempts, backoff schedule, terminal state)
//! - Conflict store (detections and append-only resolutions)
//! - Connection registry (liveness and heartbeat latency)
//! - Priority table (static drain ordering)
//! - Status aggregator (derived per-component status)
//!
//! All state changes are committed as records to a framed append-only
//! journal and replayed on open, so every store survives process restart.
//! Enqueue never touches the network; the queue processor in
//! `offsync_engine` is the only component that talks to the remote store.
//!
//! ## Key invariants
//!
//! - One journal record per state transition; no-op transitions append
//!   nothing, so duplicate processor ticks and crash-resume replays are
//!   harmless.
//! - Sequence numbers are monotone and never reused.
//! - Operations on the same record apply in enqueue order.
//! - Terminal states (synced or abandoned items, succeeded retries,
//!   disconnected sessions) never transition again. Exhausted retries are
//!   terminal for the processor but may be reset by operator resubmit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod conflict;
mod error;
mod journal;
mod priority;
mod queue;
mod retry;
mod status;
mod store;

pub use connection::{Connection, ConnectionRegistry, ConnectionStatus, HeartbeatTransition};
pub use conflict::ConflictStore;
pub use error::{CoreError, CoreResult};
pub use journal::{Journal, JournalRecord, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use priority::PriorityTable;
pub use queue::{OfflineQueue, QueueFilter};
pub use retry::{RetryLedger, RetryRecord, RetryStatus};
pub use status::{compute_indicators, ComponentStatus, StatusIndicator, StatusInputs};
pub use store::{SyncStore, SyncStoreConfig};
