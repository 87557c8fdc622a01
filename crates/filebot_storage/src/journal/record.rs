//! Journal record types and framing.
//!
//! Each frame is laid out as:
//!
//! ```text
//! +-----------+-----------+------------------+
//! | len (u32) | crc (u32) | payload (CBOR)   |
//! +-----------+-----------+------------------+
//! ```
//!
//! Both integers are little-endian; `crc` covers the payload only.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A scalar write.
    Set {
        /// Bare global name.
        global: String,
        /// Subscript path.
        subscripts: Vec<String>,
        /// Value written.
        value: String,
    },
    /// A subtree removal.
    Kill {
        /// Bare global name.
        global: String,
        /// Subscript path.
        subscripts: Vec<String>,
    },
}

impl JournalRecord {
    /// Encodes the record as a complete frame.
    pub fn encode_frame(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload).map_err(|e| StoreError::Codec(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::Codec("record exceeds frame size limit".into()))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn decode_payload(payload: &[u8], offset: u64) -> StoreResult<Self> {
        ciborium::from_reader(payload).map_err(|e| StoreError::corrupted(offset, e.to_string()))
    }
}

/// Records recovered from a journal image.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in log order.
    pub records: Vec<JournalRecord>,
    /// Length of the valid prefix. Anything past it is a torn tail.
    pub valid_len: u64,
}

impl Replay {
    /// Returns true if bytes were left over after the last whole frame.
    #[must_use]
    pub fn has_torn_tail(&self, total_len: u64) -> bool {
        self.valid_len < total_len
    }
}

/// Decodes every whole frame in `bytes`.
///
/// An incomplete frame at the end, or a checksum failure on the final
/// frame, is treated as an interrupted append and stops the scan. A
/// checksum failure on any earlier frame is corruption.
pub fn decode_frames(bytes: &[u8]) -> StoreResult<Replay> {
    let mut replay = Replay::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < FRAME_HEADER_SIZE {
            break;
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let end = FRAME_HEADER_SIZE.saturating_add(len);
        if rest.len() < end {
            break;
        }

        let payload = &rest[FRAME_HEADER_SIZE..end];
        if compute_crc32(payload) != crc {
            if pos + end == bytes.len() {
                break;
            }
            return Err(StoreError::corrupted(pos as u64, "checksum mismatch"));
        }

        replay
            .records
            .push(JournalRecord::decode_payload(payload, pos as u64)?);
        pos += end;
        replay.valid_len = pos as u64;
    }

    Ok(replay)
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

    fn set(value: &str) -> JournalRecord {
        JournalRecord::Set {
            global: "DPT".into(),
            subscripts: vec!["1".into(), ".01".into()],
            value: value.into(),
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frames_decode_in_order() {
        let mut bytes = set("SMITH,JOHN").encode_frame().unwrap();
        bytes.extend(
            JournalRecord::Kill {
                global: "DPT".into(),
                subscripts: vec!["1".into()],
            }
            .encode_frame()
            .unwrap(),
        );

        let replay = decode_frames(&bytes).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.records[0], set("SMITH,JOHN"));
        assert_eq!(replay.valid_len, bytes.len() as u64);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let first = set("A").encode_frame().unwrap();
        let second = set("B").encode_frame().unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let replay = decode_frames(&bytes).unwrap();
        assert_eq!(replay.records, vec![set("A")]);
        assert_eq!(replay.valid_len, first.len() as u64);
        assert!(replay.has_torn_tail(bytes.len() as u64));
    }

    #[test]
    fn mid_log_checksum_failure_is_corruption() {
        let mut bytes = set("A").encode_frame().unwrap();
        bytes.extend(set("B").encode_frame().unwrap());
        bytes[FRAME_HEADER_SIZE] ^= 0xFF;

        assert!(matches!(
            decode_frames(&bytes),
            Err(StoreError::Corrupted { offset: 0, .. })
        ));
    }
}
