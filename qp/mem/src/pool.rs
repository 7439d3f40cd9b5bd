//! A single fixed-block pool

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use qp_core::{q_assert, q_require, Signal};

use crate::PoolStats;

#[derive(Debug, Clone, Copy, Default)]
struct BlockHeader {
    signal: Signal,
    len: u16,
    ref_count: u8,
    generation: u16,
    in_use: bool,
}

/// Pool of `n_blocks` equally sized payload blocks.
///
/// Free blocks are kept on a stack, so `get` and `put` are O(1). The pool
/// holds no lock of its own; the framework calls it from inside its
/// critical section.
pub struct EventPool {
    block_size: usize,
    storage: Box<[u8]>,
    headers: Box<[BlockHeader]>,
    free: Vec<u16>,
    stats: PoolStats,
}

impl EventPool {
    pub fn new(block_size: usize, n_blocks: usize) -> Self {
        q_require!(100, n_blocks > 0 && n_blocks <= u16::MAX as usize);
        q_require!(101, block_size <= u16::MAX as usize);

        Self {
            block_size,
            storage: vec![0u8; block_size * n_blocks].into_boxed_slice(),
            headers: vec![BlockHeader::default(); n_blocks].into_boxed_slice(),
            // popped from the back, so block 0 goes out first
            free: (0..n_blocks as u16).rev().collect(),
            stats: PoolStats::new(n_blocks),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn n_blocks(&self) -> usize {
        self.headers.len()
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Takes a block when more than `margin` blocks are free.
    pub fn get(&mut self, margin: usize) -> Option<u16> {
        if self.free.len() <= margin {
            return None;
        }
        let slot = self.free.pop()?;
        self.stats.on_alloc();
        Some(slot)
    }

    /// Returns a block to the free stack.
    pub fn put(&mut self, slot: u16) {
        let header = &mut self.headers[slot as usize];
        q_require!(200, header.in_use);
        header.in_use = false;
        header.ref_count = 0;
        q_assert!(201, self.free.len() < self.headers.len());
        self.free.push(slot);
        self.stats.on_dealloc();
    }

    /// Stamps a freshly taken block with its event; returns the generation.
    pub(crate) fn fill(&mut self, slot: u16, signal: Signal, payload: &[u8]) -> u16 {
        q_require!(300, payload.len() <= self.block_size);
        let header = &mut self.headers[slot as usize];
        q_assert!(301, !header.in_use);
        header.generation = header.generation.wrapping_add(1);
        header.in_use = true;
        header.ref_count = 0;
        header.signal = signal;
        header.len = payload.len() as u16;
        let gen = header.generation;

        let start = slot as usize * self.block_size;
        self.storage[start..start + payload.len()].copy_from_slice(payload);
        gen
    }

    /// Fails the assertion unless `(slot, generation)` names a live block.
    pub(crate) fn check(&self, slot: u16, generation: u16) {
        let ok = self
            .headers
            .get(slot as usize)
            .map(|h| h.in_use && h.generation == generation)
            .unwrap_or(false);
        q_require!(400, ok);
    }

    pub(crate) fn ref_count(&self, slot: u16) -> u8 {
        self.headers[slot as usize].ref_count
    }

    pub(crate) fn inc_ref(&mut self, slot: u16) -> u8 {
        let header = &mut self.headers[slot as usize];
        q_assert!(500, header.ref_count < u8::MAX);
        header.ref_count += 1;
        header.ref_count
    }

    pub(crate) fn dec_ref(&mut self, slot: u16) -> u8 {
        let header = &mut self.headers[slot as usize];
        q_assert!(501, header.ref_count > 0);
        header.ref_count -= 1;
        header.ref_count
    }

    pub(crate) fn payload(&self, slot: u16) -> &[u8] {
        let len = self.headers[slot as usize].len as usize;
        let start = slot as usize * self.block_size;
        &self.storage[start..start + len]
    }
}
