#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! QS - Software Tracing Infrastructure
//!
//! Binary trace records, framed with HDLC byte stuffing and kept in a ring
//! buffer until the application drains them to a host running `qspy`.
//!
//! ## Features
//!
//! - **Predefined records** for state machines, active objects, pools, time
//!   events and the scheduler ([`Record`]), plus application records from
//!   `Record::User` upwards
//! - **Dual filtering**: global (record id) and local (QS-id, which is the
//!   priority for active objects)
//! - **Dictionaries** mapping signals, objects and user records to names
//! - **Block output**: [`Tracer::get_block`] hands out contiguous chunks
//!   for DMA-style transports
//!
//! ## Usage
//!
//! ```rust
//! use qp_qs::{filters, Record, Tracer};
//!
//! let tracer = Tracer::new(1024);
//! tracer.global_filter(filters::ALL, true);
//!
//! if let Some(rec) = tracer.begin(Record::User, 0) {
//!     rec.u8(7).str("hello").end();
//! }
//! assert!(tracer.used() > 0);
//! ```

extern crate alloc;

mod buffer;
mod dict;
mod record;
mod types;

#[cfg(feature = "std")]
mod sink;

pub use buffer::{hdlc, RingBuffer};
pub use dict::TargetInfo;
pub use record::{RecordBuilder, MAX_RECORD_LEN};
pub use types::{filters, has_timestamp, qs_ids, Record};

#[cfg(feature = "std")]
pub use sink::{TraceError, UdpSink, UDP_CHUNK};

use spin::{Mutex, MutexGuard};

/// QP version reported in the target-info record
pub const QP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) struct Inner {
    pub(crate) ring: RingBuffer,
    pub(crate) seq: u8,
    pub(crate) dropped: usize,
    global: u128,
    local: u128,
    clock: Option<fn() -> u32>,
    ticks: u32,
}

impl Inner {
    pub(crate) fn now(&mut self) -> u32 {
        match self.clock {
            Some(clock) => clock(),
            None => {
                self.ticks = self.ticks.wrapping_add(1);
                self.ticks
            }
        }
    }

    fn passes(&self, id: u8, qs_id: u8) -> bool {
        if Record::from_id(id).is_some_and(Record::is_non_maskable) {
            return true;
        }
        let global = id < 128 && self.global & (1u128 << id) != 0;
        let local = qs_id == 0 || (qs_id < 128 && self.local & (1u128 << qs_id) != 0);
        global && local
    }
}

/// The trace sink of one framework instance.
///
/// All global records start disabled and all local ids enabled.
pub struct Tracer {
    inner: Mutex<Inner>,
}

impl Tracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: RingBuffer::new(capacity),
                seq: 0,
                dropped: 0,
                global: 0,
                local: u128::MAX,
                clock: None,
                ticks: 0,
            }),
        }
    }

    /// Replaces the default timestamp (a per-record counter) with `clock`.
    pub fn with_clock(self, clock: fn() -> u32) -> Self {
        self.inner.lock().clock = Some(clock);
        self
    }

    /// Enables or disables every record id set in `mask`.
    pub fn global_filter(&self, mask: u128, enable: bool) {
        let mut inner = self.inner.lock();
        if enable {
            inner.global |= mask;
        } else {
            inner.global &= !mask;
        }
    }

    /// Enables or disables every QS-id set in `mask`.
    pub fn local_filter(&self, mask: u128, enable: bool) {
        let mut inner = self.inner.lock();
        if enable {
            inner.local |= mask;
        } else {
            inner.local &= !mask;
        }
    }

    pub fn is_enabled(&self, record: impl Into<u8>, qs_id: u8) -> bool {
        self.inner.lock().passes(record.into(), qs_id)
    }

    /// Starts a record, or returns `None` when the filters reject it.
    pub fn begin(&self, record: impl Into<u8>, qs_id: u8) -> Option<RecordBuilder<'_>> {
        let id = record.into();
        let inner = self.inner.lock();
        if !inner.passes(id, qs_id) {
            return None;
        }
        Some(RecordBuilder {
            inner,
            id,
            payload: heapless::Vec::new(),
            overflow: false,
        })
    }

    /// Bytes waiting in the ring buffer
    pub fn used(&self) -> usize {
        self.inner.lock().ring.used()
    }

    /// Records discarded because they exceeded [`MAX_RECORD_LEN`]
    pub fn dropped(&self) -> usize {
        self.inner.lock().dropped
    }

    pub fn get_byte(&self) -> Option<u8> {
        self.inner.lock().ring.get_byte()
    }

    /// Locks the buffer for block output; see [`RingBuffer::get_block`].
    pub fn buffer(&self) -> BufferGuard<'_> {
        BufferGuard {
            inner: self.inner.lock(),
        }
    }

    /// Copies out up to `max_len` contiguous bytes.
    pub fn get_block(&self, max_len: usize) -> alloc::vec::Vec<u8> {
        self.buffer().get_block(max_len).to_vec()
    }

    /// Feeds every buffered byte to `sink`, one contiguous block at a time.
    pub fn drain(&self, max_len: usize, mut sink: impl FnMut(&[u8])) -> usize {
        let mut guard = self.buffer();
        let mut total = 0;
        loop {
            let block = guard.get_block(max_len);
            if block.is_empty() {
                break total;
            }
            total += block.len();
            sink(block);
        }
    }
}

/// Exclusive access to the trace ring buffer.
pub struct BufferGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl core::ops::Deref for BufferGuard<'_> {
    type Target = RingBuffer;

    fn deref(&self) -> &RingBuffer {
        &self.inner.ring
    }
}

impl core::ops::DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut RingBuffer {
        &mut self.inner.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn frames(tracer: &Tracer) -> Vec<u8> {
        let mut out = Vec::new();
        tracer.drain(16, |b| out.extend_from_slice(b));
        out
    }

    #[test]
    fn filtered_records_are_not_written() {
        let tracer = Tracer::new(256);
        assert!(tracer.begin(Record::ActivePost, 3).is_none());

        tracer.global_filter(filters::AO, true);
        tracer.local_filter(qs_ids::AO, false);
        tracer.local_filter(1u128 << 3, true);
        assert!(tracer.begin(Record::ActivePost, 2).is_none());
        tracer.begin(Record::ActivePost, 3).map(|r| r.u8(1).end());
        assert!(tracer.used() > 0);
    }

    #[test]
    fn dictionaries_bypass_filters() {
        let tracer = Tracer::new(256);
        tracer.usr_dict(Record::User as u8, "MY_REC");
        let bytes = frames(&tracer);
        // seq 0, id 63, no timestamp, record 100, "MY_REC\0"
        assert_eq!(&bytes[..3], &[0, 63, 100]);
        assert_eq!(&bytes[3..10], b"MY_REC\0");
        assert_eq!(*bytes.last().unwrap(), hdlc::FLAG);
    }

    #[test]
    fn checksum_complements_sum() {
        let tracer = Tracer::new(64).with_clock(|| 0x0102_0304);
        tracer.global_filter(filters::ALL, true);
        tracer.begin(Record::User, 0).map(|r| r.u16(0x0506).end());
        let bytes = frames(&tracer);
        let body = &bytes[..bytes.len() - 1];
        let sum = body.iter().fold(0u8, |a, b| a.wrapping_add(*b));
        assert_eq!(sum, 0xFF);
        assert_eq!(&body[2..6], &[4, 3, 2, 1]);
    }

    #[test]
    fn sequence_numbers_advance() {
        let tracer = Tracer::new(128);
        tracer.obj_dict(1, "a");
        tracer.obj_dict(2, "b");
        let bytes = frames(&tracer);
        let second = bytes.iter().position(|b| *b == hdlc::FLAG).unwrap() + 1;
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[second], 1);
    }

    #[test]
    fn oversized_record_is_dropped() {
        let tracer = Tracer::new(1024);
        tracer.global_filter(filters::USER, true);
        let big = [0u8; MAX_RECORD_LEN];
        tracer.begin(Record::User, 0).map(|r| r.u8(1).mem(&big[..255]).end());
        assert_eq!(tracer.dropped(), 1);
        assert_eq!(tracer.used(), 0);
    }
}
