use qp_qs::{has_timestamp, hdlc};
use thiserror::Error;

/// One verified QS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QsFrame {
    /// Sequence number assigned by the target
    pub seq: u8,
    /// Record id
    pub record: u8,
    /// Present for every record except dictionaries and session records
    pub timestamp: Option<u32>,
    /// Record data following the timestamp
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short (len={0})")]
    FrameTooShort(usize),
    #[error("checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    InvalidChecksum { expected: u8, found: u8 },
    #[error("record {record} is missing its timestamp")]
    MissingTimestamp { record: u8 },
}

/// Incremental HDLC deframer.
///
/// Accepts arbitrary chunks of the byte stream and returns the frames they
/// complete. A bad frame is reported once and skipped; the next flag byte
/// starts a fresh frame.
#[derive(Debug, Default)]
pub struct HdlcDecoder {
    buffer: Vec<u8>,
    escape_next: bool,
    last_seq: Option<u8>,
    lost: usize,
}

impl HdlcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a partially received frame and forgets the sequence.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.escape_next = false;
        self.last_seq = None;
    }

    /// Frames missed so far, judged by gaps in the sequence numbers
    pub fn lost(&self) -> usize {
        self.lost
    }

    pub fn push_bytes(&mut self, input: &[u8]) -> Vec<Result<QsFrame, DecodeError>> {
        let mut frames = Vec::new();

        for &byte in input {
            if byte == hdlc::FLAG {
                self.escape_next = false;
                if !self.buffer.is_empty() {
                    let raw = std::mem::take(&mut self.buffer);
                    let frame = Self::decode_frame(&raw);
                    if let Ok(f) = &frame {
                        self.track_seq(f.seq);
                    }
                    frames.push(frame);
                }
            } else if self.escape_next {
                self.buffer.push(byte ^ hdlc::ESC_XOR);
                self.escape_next = false;
            } else if byte == hdlc::ESC {
                self.escape_next = true;
            } else {
                self.buffer.push(byte);
            }
        }

        frames
    }

    fn track_seq(&mut self, seq: u8) {
        if let Some(last) = self.last_seq {
            self.lost += seq.wrapping_sub(last).wrapping_sub(1) as usize;
        }
        self.last_seq = Some(seq);
    }

    fn decode_frame(data: &[u8]) -> Result<QsFrame, DecodeError> {
        if data.len() < 3 {
            return Err(DecodeError::FrameTooShort(data.len()));
        }

        let (body, checksum) = data.split_at(data.len() - 1);
        let expected = !body.iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
        if checksum[0] != expected {
            return Err(DecodeError::InvalidChecksum {
                expected,
                found: checksum[0],
            });
        }

        let (seq, record) = (body[0], body[1]);
        let mut rest = &body[2..];
        let timestamp = if has_timestamp(record) {
            let Some((ts, data)) = rest.split_first_chunk::<4>() else {
                return Err(DecodeError::MissingTimestamp { record });
            };
            rest = data;
            Some(u32::from_le_bytes(*ts))
        } else {
            None
        };

        Ok(QsFrame {
            seq,
            record,
            timestamp,
            payload: rest.to_vec(),
        })
    }
}
