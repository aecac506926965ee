//! Log backend trait definition.

use crate::error::StorageResult;

/// A low-level append-only byte store backing the sync journal.
///
/// Backends store opaque bytes. The journal owns record framing and
/// checksums; backends only guarantee:
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync_all` returns, appended data survives process termination
/// - `truncate` discards everything at and after the given offset
///   (used to drop a torn record found during recovery)
pub trait LogBackend: Send + Sync {
    /// Appends data to the end of the log, returning the write offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current log size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Flushes buffered writes to the OS.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// Stronger than [`flush`](LogBackend::flush): after this returns the
    /// data is guaranteed to survive a crash.
    fn sync_all(&mut self) -> StorageResult<()>;

    /// Returns the current log size in bytes.
    ///
    /// This is the offset the next `append` will write at.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the log is empty.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncates the log to `new_size` bytes.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
