//! # offsync Engine
//!
//! Background machinery that drains the offline queue:
//!
//! - Queue processor with a bounded worker pool and per-record ordering
//! - Exponential backoff with jitter for transient failures
//! - Remote store abstraction (and a scripted mock for testing)
//! - Push feed distributing state changes to live connections
//! - Heartbeat monitor for the connection registry
//!
//! ## Key invariants
//!
//! - At most one operation per record is in flight at any time
//! - Same-record operations apply in enqueue order; cross-record order
//!   follows the priority table
//! - Backoff waits are scheduled re-checks, never blocking sleeps; a
//!   manual retry or restored connectivity cancels them immediately
//! - Enqueue never waits on the network

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod heartbeat;
mod notify;
mod processor;
mod remote;

pub use config::{EngineConfig, HeartbeatConfig, RetryConfig};
pub use error::{EngineError, EngineResult};
pub use heartbeat::HeartbeatMonitor;
pub use notify::{PushFeed, SyncEvent};
pub use processor::{ProcessorStats, QueueProcessor};
pub use remote::{MockOutcome, MockRemote, RemoteStore};
