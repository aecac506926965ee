//! # offsync Storage
//!
//! Append-only log backends for the offsync journal.
//!
//! Backends are **opaque byte stores**: they append, read back, and flush
//! bytes, and know nothing about journal framing, queue items, or any other
//! higher-level concept. The journal in `offsync_core` owns all framing.
//!
//! ## Available backends
//!
//! - [`MemoryBackend`] - ephemeral, for tests
//! - [`FileBackend`] - persistent, survives process restart
//!
//! ## Example
//!
//! ```rust
//! use offsync_storage::{LogBackend, MemoryBackend};
//!
//! let mut backend = MemoryBackend::new();
//! let offset = backend.append(b"queued mutation").unwrap();
//! assert_eq!(backend.read_at(offset, 15).unwrap(), b"queued mutation");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::LogBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
