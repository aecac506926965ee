//! Error types for offsync core.

use offsync_protocol::{ConflictId, ConnectionId, OperationId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the sync stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] offsync_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Protocol(#[from] offsync_protocol::ProtocolError),

    /// The journal contains an unreadable record.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// A journal record failed its CRC check.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Byte offset of the bad record.
        offset: u64,
        /// CRC stored in the record.
        expected: u32,
        /// CRC computed over the record bytes.
        actual: u32,
    },

    /// No queue item with the given id.
    #[error("unknown operation: {0}")]
    UnknownOperation(OperationId),

    /// No conflict with the given id.
    #[error("unknown conflict: {0}")]
    UnknownConflict(ConflictId),

    /// No connection with the given id.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// `retry_operation` called on a retry record in a terminal state.
    #[error("operation {operation_id} is not retryable (status: {status})")]
    NotRetryable {
        /// The operation.
        operation_id: OperationId,
        /// Its terminal retry status.
        status: &'static str,
    },

    /// Abandon/resubmit called on an operation that is not exhausted.
    #[error("operation {0} is not exhausted; only exhausted operations take manual intervention")]
    NotExhausted(OperationId),

    /// Manual resolution requires a merged payload.
    #[error("conflict {0} resolved manually without a merged payload")]
    MissingMergePayload(ConflictId),

    /// Resolution history is append-only; a conflict resolves once.
    #[error("conflict {0} is already resolved")]
    ConflictAlreadyResolved(ConflictId),

    /// Pings cannot revive a disconnected session; reconnects register a
    /// new connection row.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}
