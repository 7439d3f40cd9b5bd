//! Record construction

use heapless::Vec;
use qp_core::Signal;
use spin::MutexGuard;

use crate::buffer::write_frame;
use crate::types::has_timestamp;
use crate::Inner;

/// Largest payload a single record can carry
pub const MAX_RECORD_LEN: usize = 256;

/// A record being filled in. Obtained from [`Tracer::begin`](crate::Tracer::begin)
/// and committed with [`end`](Self::end); dropping it discards the record.
///
/// The tracer stays locked while the builder is alive, so records from
/// different contexts never interleave.
pub struct RecordBuilder<'a> {
    pub(crate) inner: MutexGuard<'a, Inner>,
    pub(crate) id: u8,
    pub(crate) payload: Vec<u8, MAX_RECORD_LEN>,
    pub(crate) overflow: bool,
}

impl<'a> RecordBuilder<'a> {
    fn put(&mut self, bytes: &[u8]) {
        if self.payload.extend_from_slice(bytes).is_err() {
            self.overflow = true;
        }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.put(&[v]);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.put(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.put(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.put(&v.to_le_bytes());
        self
    }

    pub fn i32(self, v: i32) -> Self {
        self.u32(v as u32)
    }

    pub fn signal(self, sig: Signal) -> Self {
        self.u16(sig.raw())
    }

    /// Object reference (8 bytes)
    pub fn obj(self, obj: u64) -> Self {
        self.u64(obj)
    }

    /// Zero-terminated string
    pub fn str(mut self, s: &str) -> Self {
        self.put(s.as_bytes());
        self.put(&[0]);
        self
    }

    /// Length-prefixed memory block, at most 255 bytes
    pub fn mem(mut self, bytes: &[u8]) -> Self {
        let n = bytes.len().min(u8::MAX as usize);
        self.put(&[n as u8]);
        self.put(&bytes[..n]);
        self
    }

    /// Frames the record into the ring buffer.
    pub fn end(mut self) {
        if self.overflow {
            self.inner.dropped += 1;
            log::warn!("trace record {} exceeds {} bytes, dropped", self.id, MAX_RECORD_LEN);
            return;
        }
        let inner = &mut *self.inner;
        let timestamp = has_timestamp(self.id).then(|| inner.now());
        let seq = inner.seq;
        inner.seq = seq.wrapping_add(1);
        write_frame(&mut inner.ring, seq, self.id, timestamp, &self.payload);
    }
}
