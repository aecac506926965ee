//! Journal record types and framing.

use crate::connection::{Connection, ConnectionStatus};
use crate::error::{CoreError, CoreResult};
use crate::retry::RetryRecord;
use offsync_protocol::{
    from_cbor, to_cbor, Conflict, ConflictId, ConnectionId, OperationId, QueueItem,
    ResolutionStrategy, SyncStatus, Timestamp, Version,
};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"OSYN";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + payload length (4).
pub(crate) const HEADER_SIZE: usize = 10;

/// CRC trailer size.
pub(crate) const CRC_SIZE: usize = 4;

/// One state transition in the sync stores.
///
/// Records are applied identically during live commits and restart
/// replay, so application must be deterministic and idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A mutation was enqueued.
    Enqueued {
        /// The full new queue row.
        item: QueueItem,
    },

    /// A queue item changed sync status.
    QueueStatusChanged {
        /// The operation.
        id: OperationId,
        /// New status.
        status: SyncStatus,
        /// Error message accompanying a failure, if any.
        error: Option<String>,
        /// When the transition happened.
        at: Timestamp,
    },

    /// A conflicted or exhausted item was put back in play: base version
    /// refreshed, optionally with a merged payload, status back to
    /// pending. The sequence number is preserved so the item stays ahead
    /// of operations queued behind it.
    QueueRequeued {
        /// The operation.
        id: OperationId,
        /// Refreshed base version.
        base_version: Version,
        /// Replacement payload for manual merges.
        payload: Option<Vec<u8>>,
        /// When the requeue happened.
        at: Timestamp,
    },

    /// A retry record was created or updated (full-row upsert).
    RetryUpserted {
        /// The retry row.
        record: RetryRecord,
    },

    /// A version mismatch was detected.
    ConflictDetected {
        /// The full new conflict row.
        conflict: Conflict,
    },

    /// An open conflict was resolved.
    ConflictResolved {
        /// The conflict.
        id: ConflictId,
        /// Strategy used.
        strategy: ResolutionStrategy,
        /// Operator or rule that resolved it.
        resolved_by: String,
        /// When it was resolved.
        at: Timestamp,
    },

    /// A client session connected.
    ConnectionRegistered {
        /// The full new connection row.
        connection: Connection,
    },

    /// A heartbeat ping arrived.
    ConnectionPinged {
        /// The connection.
        id: ConnectionId,
        /// When the ping arrived.
        at: Timestamp,
        /// Measured round-trip latency.
        latency_ms: u64,
    },

    /// A connection changed liveness state.
    ConnectionStatusChanged {
        /// The connection.
        id: ConnectionId,
        /// New status.
        status: ConnectionStatus,
        /// When the transition happened.
        at: Timestamp,
    },
}

impl JournalRecord {
    /// Encodes this record as a complete frame (header, payload, CRC).
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let payload = to_cbor(self)?;

        let len = u32::try_from(payload.len()).map_err(|_| CoreError::JournalCorruption {
            offset: 0,
            message: "record payload exceeds 4 GiB".into(),
        })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        Ok(frame)
    }

    /// Decodes a record from a frame payload.
    pub fn decode_payload(payload: &[u8]) -> CoreResult<Self> {
        Ok(from_cbor(payload)?)
    }
}

/// CRC32 (IEEE polynomial) over the given bytes.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_protocol::{MutationAction, RecordKey, SequenceNumber};

    fn sample_record() -> JournalRecord {
        JournalRecord::Enqueued {
            item: QueueItem::new(
                SequenceNumber(1),
                MutationAction::Create,
                RecordKey::new("jobs", "job-1"),
                vec![0x01, 0x02],
                Version::INITIAL,
                Timestamp(42),
            ),
        }
    }

    #[test]
    fn frame_roundtrip() {
        let record = sample_record();
        let frame = record.encode_frame().unwrap();

        assert_eq!(&frame[0..4], &JOURNAL_MAGIC);
        assert_eq!(
            u16::from_le_bytes([frame[4], frame[5]]),
            JOURNAL_VERSION
        );

        let len = u32::from_le_bytes([frame[6], frame[7], frame[8], frame[9]]) as usize;
        assert_eq!(frame.len(), HEADER_SIZE + len + CRC_SIZE);

        let payload = &frame[HEADER_SIZE..HEADER_SIZE + len];
        let decoded = JournalRecord::decode_payload(payload).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn crc_detects_flipped_bit() {
        let record = sample_record();
        let mut frame = record.encode_frame().unwrap();

        let stored = u32::from_le_bytes(
            frame[frame.len() - CRC_SIZE..].try_into().unwrap(),
        );
        frame[HEADER_SIZE] ^= 0x80;

        let actual = compute_crc32(&frame[..frame.len() - CRC_SIZE]);
        assert_ne!(stored, actual);
    }

    #[test]
    fn crc32_known_vectors() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0x0000_0000);
    }
}
