//! Error types for the engine.

use offsync_protocol::{OperationId, RemoteError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while processing the queue.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Durable store failure.
    #[error("store error: {0}")]
    Store(#[from] offsync_core::CoreError),

    /// Remote apply failed without producing an outcome.
    #[error("remote error for {operation_id}: {source}")]
    Remote {
        /// Operation being applied.
        operation_id: OperationId,
        /// Underlying remote failure.
        #[source]
        source: RemoteError,
    },

    /// The processor is shutting down.
    #[error("engine shutting down")]
    ShuttingDown,
}
