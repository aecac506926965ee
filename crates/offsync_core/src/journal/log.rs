//! Journal append and recovery.

use crate::error::{CoreError, CoreResult};
use crate::journal::record::{CRC_SIZE, HEADER_SIZE};
use crate::journal::{compute_crc32, JournalRecord, JOURNAL_MAGIC, JOURNAL_VERSION};
use offsync_storage::{LogBackend, StorageError};
use tracing::{debug, warn};

/// Append-side journal handle.
///
/// Appends are flushed per record; `sync_on_commit` additionally forces
/// data to disk before the commit is acknowledged.
pub struct Journal {
    backend: Box<dyn LogBackend>,
    sync_on_commit: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn LogBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends a record, returning its offset.
    pub fn append(&mut self, record: &JournalRecord) -> CoreResult<u64> {
        let frame = record.encode_frame()?;
        let offset = self.backend.append(&frame)?;
        if self.sync_on_commit {
            self.backend.sync_all()?;
        } else {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.len()?)
    }

    /// Reads every record from the start of the journal.
    ///
    /// A torn record at the tail (crash mid-append) is truncated away with
    /// a warning; an unreadable record anywhere else is a hard error since
    /// state after it cannot be trusted.
    pub fn recover(&mut self) -> CoreResult<Vec<JournalRecord>> {
        let size = self.backend.len()?;
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            match self.read_frame(offset, size) {
                Ok((record, next)) => {
                    records.push(record);
                    offset = next;
                }
                Err(TailState::Torn(message)) => {
                    warn!(offset, %message, "truncating torn journal tail");
                    self.backend.truncate(offset)?;
                    self.backend.sync_all()?;
                    break;
                }
                Err(TailState::Corrupt(error)) => return Err(error),
            }
        }

        debug!(records = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Reads one frame at `offset`, returning the record and the offset
    /// of the next frame.
    fn read_frame(&self, offset: u64, size: u64) -> Result<(JournalRecord, u64), TailState> {
        let header = match self.backend.read_at(offset, HEADER_SIZE) {
            Ok(bytes) => bytes,
            Err(StorageError::ReadPastEnd { .. }) => {
                return Err(TailState::Torn("incomplete record header".into()))
            }
            Err(e) => return Err(TailState::Corrupt(e.into())),
        };

        if header[0..4] != JOURNAL_MAGIC {
            return Err(TailState::Corrupt(CoreError::JournalCorruption {
                offset,
                message: "bad magic bytes".into(),
            }));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != JOURNAL_VERSION {
            return Err(TailState::Corrupt(CoreError::JournalCorruption {
                offset,
                message: format!("unsupported journal version {version}"),
            }));
        }

        let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
        let body = match self
            .backend
            .read_at(offset + HEADER_SIZE as u64, len + CRC_SIZE)
        {
            Ok(bytes) => bytes,
            Err(StorageError::ReadPastEnd { .. }) => {
                return Err(TailState::Torn("incomplete record body".into()))
            }
            Err(e) => return Err(TailState::Corrupt(e.into())),
        };

        let payload = &body[..len];
        let stored_crc = u32::from_le_bytes([
            body[len],
            body[len + 1],
            body[len + 2],
            body[len + 3],
        ]);

        let mut checked = Vec::with_capacity(HEADER_SIZE + len);
        checked.extend_from_slice(&header);
        checked.extend_from_slice(payload);
        let actual_crc = compute_crc32(&checked);

        let end = offset + (HEADER_SIZE + len + CRC_SIZE) as u64;
        if stored_crc != actual_crc {
            // A bad CRC on the final frame is a torn write; earlier it
            // means real corruption.
            if end == size {
                return Err(TailState::Torn("checksum mismatch on final record".into()));
            }
            return Err(TailState::Corrupt(CoreError::ChecksumMismatch {
                offset,
                expected: stored_crc,
                actual: actual_crc,
            }));
        }

        let record = JournalRecord::decode_payload(payload).map_err(|e| {
            TailState::Corrupt(CoreError::JournalCorruption {
                offset,
                message: e.to_string(),
            })
        })?;

        Ok((record, end))
    }
}

/// Outcome of a failed frame read: recoverable torn tail vs corruption.
enum TailState {
    Torn(String),
    Corrupt(CoreError),
}
