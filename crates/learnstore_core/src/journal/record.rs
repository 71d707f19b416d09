//! Journal operations and their on-disk frames.
//!
//! Every frame is laid out as:
//!
//! ```text
//! magic (4) | version (2) | payload length (4) | CBOR payload | crc32 (4)
//! ```
//!
//! The CRC covers everything before it. A frame that is cut short or whose
//! CRC does not match ends the readable part of the journal.

use crate::error::{CoreError, CoreResult};
use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes identifying a journal frame.
pub const FRAME_MAGIC: [u8; 4] = *b"LSJF";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub const HEADER_SIZE: usize = 10;

/// Trailing CRC size.
pub const CRC_SIZE: usize = 4;

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or replace a record.
    Put {
        /// Target collection.
        collection: String,
        /// Full record, id included.
        record: Record,
    },
    /// Remove a record.
    Delete {
        /// Target collection.
        collection: String,
        /// Record id.
        id: String,
    },
    /// Remove every record of a collection.
    Clear {
        /// Target collection.
        collection: String,
    },
    /// Several operations applied together or not at all.
    Batch {
        /// Operations in application order.
        ops: Vec<JournalOp>,
    },
    /// Store a cache entry.
    CacheSet {
        /// Cache key.
        key: String,
        /// Stored value.
        value: Value,
        /// Expiry in Unix milliseconds, `None` for never.
        expires_at: Option<i64>,
    },
    /// Drop a cache entry.
    CacheRemove {
        /// Cache key.
        key: String,
    },
}

impl JournalOp {
    /// Encodes the operation as a complete frame.
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(self, &mut payload)
            .map_err(|e| CoreError::serialization(format!("journal encode: {e}")))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("journal frame payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&FRAME_MAGIC);
        frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes the frame at the start of `data`.
    ///
    /// Returns the operation and the frame length, or `None` if `data` does
    /// not begin with a complete, intact frame.
    pub fn decode_frame(data: &[u8]) -> CoreResult<Option<(Self, usize)>> {
        if data.len() < HEADER_SIZE + CRC_SIZE {
            return Ok(None);
        }
        if data[0..4] != FRAME_MAGIC {
            return Ok(None);
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FRAME_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported journal frame version {version}"
            )));
        }

        let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if data.len() < total {
            return Ok(None);
        }

        let body_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        if compute_crc32(&data[..body_end]) != stored {
            return Ok(None);
        }

        let op = ciborium::de::from_reader(&data[HEADER_SIZE..body_end])
            .map_err(|e| CoreError::serialization(format!("journal decode: {e}")))?;
        Ok(Some((op, total)))
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
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
    use serde_json::json;

    fn put(id: &str) -> JournalOp {
        JournalOp::Put {
            collection: "users".into(),
            record: Record::from_value(json!({"id": id, "age": 31, "score": 2.5})).unwrap(),
        }
    }

    #[test]
    fn frame_decodes_to_the_same_op() {
        let op = JournalOp::Batch {
            ops: vec![
                put("u1"),
                JournalOp::Delete {
                    collection: "users".into(),
                    id: "u0".into(),
                },
            ],
        };
        let frame = op.encode_frame().unwrap();
        let (decoded, len) = JournalOp::decode_frame(&frame).unwrap().unwrap();
        assert_eq!(decoded, op);
        assert_eq!(len, frame.len());
    }

    #[test]
    fn truncated_frame_is_not_readable() {
        let frame = put("u1").encode_frame().unwrap();
        assert!(JournalOp::decode_frame(&frame[..frame.len() - 1])
            .unwrap()
            .is_none());
    }

    #[test]
    fn flipped_byte_fails_the_crc() {
        let mut frame = put("u1").encode_frame().unwrap();
        frame[HEADER_SIZE + 2] ^= 0xFF;
        assert!(JournalOp::decode_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn cache_entries_keep_their_expiry() {
        let op = JournalOp::CacheSet {
            key: "migrations:applied".into(),
            value: json!([1, 2]),
            expires_at: Some(1_700_000_000_000),
        };
        let frame = op.encode_frame().unwrap();
        assert_eq!(JournalOp::decode_frame(&frame).unwrap().unwrap().0, op);
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
