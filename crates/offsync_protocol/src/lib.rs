//! # offsync Protocol
//!
//! Shared types for the offsync engine: mutation envelopes, version tokens,
//! priority rules, queue item and conflict rows, and the remote-apply
//! request/outcome contract.
//!
//! The engine treats payloads as opaque byte blobs inside a typed envelope
//! (collection, record id, action, base version). It never inspects
//! business schemas.
//!
//! This is a pure type crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod codec;
mod conflict;
mod error;
mod mutation;
mod priority;
mod types;

pub use apply::{ApplyOutcome, ApplyRequest, RemoteError};
pub use codec::{from_cbor, to_cbor};
pub use conflict::{Conflict, ConflictFilter, ResolutionStrategy};
pub use error::{ProtocolError, ProtocolResult};
pub use mutation::{MutationAction, QueueItem, RecordKey, SyncStatus};
pub use priority::{PriorityClass, PriorityRule};
pub use types::{ConflictId, ConnectionId, OperationId, SequenceNumber, Timestamp, Version};
