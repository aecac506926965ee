//! Framed append-only journal for sync state.
//!
//! Every state transition in the stores is one [`JournalRecord`] appended
//! here; replaying the journal on open rebuilds the exact in-memory state.
//! Records are framed as:
//!
//! ```text
//! magic (4) | version (2 LE) | payload len (4 LE) | CBOR payload | CRC32 (4 LE)
//! ```
//!
//! The CRC covers everything before it. A torn record at the tail (crash
//! mid-append) is detected and truncated away during recovery; corruption
//! anywhere else is a hard error.

mod log;
mod record;

pub use log::Journal;
pub use record::{JournalRecord, JOURNAL_MAGIC, JOURNAL_VERSION};

pub(crate) use record::compute_crc32;
