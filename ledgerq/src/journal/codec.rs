use crate::common::{FRAME_HEADER_SIZE, JOURNAL_FORMAT_VERSION, JOURNAL_MAGIC, MAX_FRAME_SIZE};
use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// First frame of every journal file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JournalHeader {
    magic: u32,
    version: u16,
    next_transaction_id: u64,
    next_sequence: u64,
}

impl JournalHeader {
    pub(crate) fn new(next_transaction_id: u64, next_sequence: u64) -> Self {
        JournalHeader {
            magic: JOURNAL_MAGIC,
            version: JOURNAL_FORMAT_VERSION,
            next_transaction_id,
            next_sequence,
        }
    }

    pub(crate) fn next_transaction_id(&self) -> u64 {
        self.next_transaction_id
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if self.magic != JOURNAL_MAGIC {
            log::error!("Journal header has an unknown magic number {:#x}", self.magic);
            return Err(LedgerError::new(
                "Not a ledgerq journal file",
                ErrorKind::JournalCorrupted,
            ));
        }
        if self.version != JOURNAL_FORMAT_VERSION {
            log::error!("Unsupported journal format version {}", self.version);
            return Err(LedgerError::new(
                &format!("Unsupported journal format version {}", self.version),
                ErrorKind::JournalCorrupted,
            ));
        }
        Ok(())
    }
}

/// Encodes a value as `u32 length | u32 crc32(length) | u32 crc32(body) | bincode body`,
/// little-endian.
pub(crate) fn encode_frame<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(value, bincode::config::legacy())?;
    if body.len() > MAX_FRAME_SIZE as usize {
        log::error!("Journal record of {} bytes exceeds the frame limit", body.len());
        return Err(LedgerError::new(
            &format!("Journal record of {} bytes is too large", body.len()),
            ErrorKind::EncodingError,
        ));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    let len = (body.len() as u32).to_le_bytes();
    frame.extend_from_slice(&len);
    frame.extend_from_slice(&crc32fast::hash(&len).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body. A body that passed its checksum but does not decode means the
/// file was written by something else, so it is reported as corruption.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> LedgerResult<T> {
    bincode::serde::decode_from_slice(body, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| {
            log::error!("Failed to decode journal record: {}", e);
            LedgerError::new(
                &format!("Undecodable journal record: {}", e),
                ErrorKind::JournalCorrupted,
            )
        })
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Frame(Vec<u8>),
    End,
    /// An incomplete or unchecked final frame starting at `offset`.
    Torn { offset: u64 },
    /// A damaged frame followed by more data.
    Corrupted { offset: u64, reason: String },
}

/// Reads frames sequentially up to a fixed byte limit.
pub(crate) struct FrameReader<R> {
    reader: R,
    offset: u64,
    limit: u64,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(reader: R, limit: u64) -> Self {
        FrameReader {
            reader,
            offset: 0,
            limit,
        }
    }

    /// Byte offset just past the last complete frame.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn next_frame(&mut self) -> LedgerResult<FrameOutcome> {
        let offset = self.offset;
        let remaining = self.limit.saturating_sub(offset);
        if remaining == 0 {
            return Ok(FrameOutcome::End);
        }
        if remaining < FRAME_HEADER_SIZE as u64 {
            return Ok(FrameOutcome::Torn { offset });
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        if header.iter().all(|b| *b == 0) {
            // zero-filled blocks left behind by an interrupted write
            return if self.rest_is_zeroed(remaining - FRAME_HEADER_SIZE as u64)? {
                Ok(FrameOutcome::Torn { offset })
            } else {
                Ok(FrameOutcome::Corrupted {
                    offset,
                    reason: "empty frame".to_string(),
                })
            };
        }

        let len_bytes = [header[0], header[1], header[2], header[3]];
        let len_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if crc32fast::hash(&len_bytes) != len_crc {
            return Ok(FrameOutcome::Corrupted {
                offset,
                reason: "frame length checksum mismatch".to_string(),
            });
        }

        let len = u32::from_le_bytes(len_bytes);
        if len == 0 || len > MAX_FRAME_SIZE {
            return Ok(FrameOutcome::Corrupted {
                offset,
                reason: format!("invalid frame length {}", len),
            });
        }

        // the length is verified, so a frame running past the end is a cut-off write
        let frame_len = FRAME_HEADER_SIZE as u64 + len as u64;
        if frame_len > remaining {
            return Ok(FrameOutcome::Torn { offset });
        }

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body)?;
        if crc32fast::hash(&body) != crc {
            return if frame_len == remaining {
                Ok(FrameOutcome::Torn { offset })
            } else {
                Ok(FrameOutcome::Corrupted {
                    offset,
                    reason: "checksum mismatch".to_string(),
                })
            };
        }

        self.offset += frame_len;
        Ok(FrameOutcome::Frame(body))
    }

    fn rest_is_zeroed(&mut self, mut remaining: u64) -> LedgerResult<bool> {
        let mut chunk = [0u8; 4096];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            self.reader.read_exact(&mut chunk[..n])?;
            if chunk[..n].iter().any(|b| *b != 0) {
                return Ok(false);
            }
            remaining -= n as u64;
        }
        Ok(true)
    }
}
