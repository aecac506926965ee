//! Error types for protocol encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A string field did not name a known variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// What kind of value was being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },

    /// An identifier string did not parse.
    #[error("invalid {kind} id: {value}")]
    InvalidId {
        /// Which id type was being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}
