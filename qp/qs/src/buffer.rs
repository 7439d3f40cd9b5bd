//! Trace ring buffer and HDLC framing

use alloc::boxed::Box;
use alloc::vec;

/// HDLC protocol constants
pub mod hdlc {
    /// Frame delimiter
    pub const FLAG: u8 = 0x7E;
    /// Escape byte
    pub const ESC: u8 = 0x7D;
    /// XOR mask applied to an escaped byte
    pub const ESC_XOR: u8 = 0x20;
}

/// Byte ring buffer holding complete HDLC frames.
///
/// When a frame does not fit, the oldest bytes are overwritten; the host
/// resynchronises on the next [`hdlc::FLAG`].
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
    used: usize,
    overwritten: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        qp_core::q_require!(100, capacity > 0);
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            used: 0,
            overwritten: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes waiting to be read
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Bytes lost to overwrites since creation
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.used = 0;
    }

    pub(crate) fn push(&mut self, byte: u8) {
        let cap = self.data.len();
        if self.used == cap {
            self.tail = (self.tail + 1) % cap;
            self.used -= 1;
            self.overwritten += 1;
        }
        self.data[self.head] = byte;
        self.head = (self.head + 1) % cap;
        self.used += 1;
    }

    /// Pushes `byte`, escaping it when it collides with a control byte.
    pub(crate) fn push_escaped(&mut self, byte: u8) {
        if byte == hdlc::FLAG || byte == hdlc::ESC {
            self.push(hdlc::ESC);
            self.push(byte ^ hdlc::ESC_XOR);
        } else {
            self.push(byte);
        }
    }

    /// Takes the oldest byte.
    pub fn get_byte(&mut self) -> Option<u8> {
        if self.used == 0 {
            return None;
        }
        let byte = self.data[self.tail];
        self.tail = (self.tail + 1) % self.data.len();
        self.used -= 1;
        Some(byte)
    }

    /// Takes up to `max_len` of the oldest bytes that are contiguous in
    /// memory. A wrapped buffer needs two calls to empty.
    pub fn get_block(&mut self, max_len: usize) -> &[u8] {
        let cap = self.data.len();
        let n = self.used.min(max_len).min(cap - self.tail);
        let start = self.tail;
        self.tail = (self.tail + n) % cap;
        self.used -= n;
        &self.data[start..start + n]
    }
}

/// Appends one complete frame: `seq, id, [timestamp], payload, checksum, FLAG`.
///
/// The checksum is the complement of the byte sum of everything before it
/// and is computed on the unescaped bytes.
pub(crate) fn write_frame(
    buf: &mut RingBuffer,
    seq: u8,
    id: u8,
    timestamp: Option<u32>,
    payload: &[u8],
) {
    let mut sum = seq.wrapping_add(id);
    buf.push_escaped(seq);
    buf.push_escaped(id);
    if let Some(ts) = timestamp {
        for b in ts.to_le_bytes() {
            sum = sum.wrapping_add(b);
            buf.push_escaped(b);
        }
    }
    for &b in payload {
        sum = sum.wrapping_add(b);
        buf.push_escaped(b);
    }
    buf.push_escaped(!sum);
    buf.push(hdlc::FLAG);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_stops_at_wrap_point() {
        let mut ring = RingBuffer::new(4);
        for b in 1..=3 {
            ring.push(b);
        }
        assert_eq!(ring.get_byte(), Some(1));
        assert_eq!(ring.get_byte(), Some(2));
        ring.push(4);
        ring.push(5);

        assert_eq!(ring.get_block(10), &[3, 4]);
        assert_eq!(ring.get_block(10), &[5]);
        assert!(ring.get_block(10).is_empty());
    }

    #[test]
    fn full_buffer_drops_oldest() {
        let mut ring = RingBuffer::new(3);
        for b in 1..=5 {
            ring.push(b);
        }
        assert_eq!(ring.used(), 3);
        assert_eq!(ring.overwritten(), 2);
        assert_eq!(ring.get_byte(), Some(3));
    }

    #[test]
    fn control_bytes_are_escaped() {
        let mut ring = RingBuffer::new(32);
        write_frame(&mut ring, 0, 0x7E, None, &[0x7D]);
        let mut out = [0u8; 32];
        let mut n = 0;
        while let Some(b) = ring.get_byte() {
            out[n] = b;
            n += 1;
        }
        // seq, ESC 5E, ESC 5D, checksum, FLAG
        assert_eq!(&out[..5], &[0x00, 0x7D, 0x5E, 0x7D, 0x5D]);
        assert_eq!(out[n - 1], hdlc::FLAG);
    }
}
