#![no_std]
#![forbid(unsafe_code)]

//! # QP Memory Management
//!
//! Fixed-block event pools with reference counting. Several pools of
//! increasing block size form a [`PoolSet`]; an event is drawn from the
//! smallest pool whose blocks fit its payload, so allocation and release
//! stay deterministic.

extern crate alloc;

pub mod events;
pub mod pool;

pub use events::*;
pub use pool::EventPool;

use heapless::Vec;
use qp_core::{q_error, q_require, Signal};

/// Maximum number of pools in a [`PoolSet`]
pub const MAX_EVENT_POOLS: usize = 3;

/// Margin value meaning "the caller cannot cope with failure".
///
/// Allocating or posting with this margin asserts instead of returning
/// `None`/`Err`.
pub const NO_MARGIN: u16 = u16::MAX;

/// Memory pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of blocks in the pool
    pub total_blocks: usize,
    /// Number of free blocks currently available
    pub free_blocks: usize,
    /// Number of blocks currently in use
    pub used_blocks: usize,
    /// Minimum number of free blocks ever reached
    pub min_free_blocks: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub const fn new(total_blocks: usize) -> Self {
        Self {
            total_blocks,
            free_blocks: total_blocks,
            used_blocks: 0,
            min_free_blocks: total_blocks,
        }
    }

    /// Update statistics after allocation
    pub fn on_alloc(&mut self) {
        self.used_blocks += 1;
        self.free_blocks -= 1;
        if self.free_blocks < self.min_free_blocks {
            self.min_free_blocks = self.free_blocks;
        }
    }

    /// Update statistics after deallocation
    pub fn on_dealloc(&mut self) {
        if self.used_blocks > 0 {
            self.used_blocks -= 1;
            self.free_blocks += 1;
        }
    }

    /// Get utilization as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            ((self.used_blocks * 100) / self.total_blocks) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total_blocks,
            self.free_blocks,
            self.used_blocks,
            self.min_free_blocks
        );
    }
}

/// The framework's event pools, ordered by block size.
#[derive(Default)]
pub struct PoolSet {
    pools: Vec<EventPool, MAX_EVENT_POOLS>,
}

impl PoolSet {
    pub const fn new() -> Self {
        Self { pools: Vec::new() }
    }

    /// Adds a pool and returns its id.
    ///
    /// Pools must be added in strictly increasing block size.
    pub fn init_pool(&mut self, block_size: usize, n_blocks: usize) -> u8 {
        if let Some(last) = self.pools.last() {
            q_require!(100, block_size > last.block_size());
        }
        if self.pools.push(EventPool::new(block_size, n_blocks)).is_err() {
            q_error!(101);
        }
        log::debug!(
            "event pool {} ready: {} blocks of {} bytes",
            self.pools.len(),
            n_blocks,
            block_size
        );
        self.pools.len() as u8
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Largest payload any pool can hold
    pub fn max_block_size(&self) -> usize {
        self.pools.last().map(EventPool::block_size).unwrap_or(0)
    }

    pub fn pool(&self, pool_id: u8) -> &EventPool {
        q_require!(200, pool_id >= 1 && pool_id as usize <= self.pools.len());
        &self.pools[pool_id as usize - 1]
    }

    fn pool_mut(&mut self, pool_id: u8) -> &mut EventPool {
        q_require!(201, pool_id >= 1 && pool_id as usize <= self.pools.len());
        &mut self.pools[pool_id as usize - 1]
    }

    /// Lowest number of free blocks the pool has ever had
    pub fn min_free(&self, pool_id: u8) -> usize {
        self.pool(pool_id).stats().min_free_blocks
    }

    /// Draws an event from the smallest pool that fits `payload`.
    ///
    /// The new event has a reference count of zero. With [`NO_MARGIN`] an
    /// empty pool is fatal; otherwise `None` comes back when taking a block
    /// would leave `margin` or fewer blocks free.
    pub fn alloc(&mut self, signal: Signal, payload: &[u8], margin: u16) -> Option<EventRef> {
        let idx = self.pools.iter().position(|p| payload.len() <= p.block_size());
        let Some(idx) = idx else {
            q_error!(300)
        };
        let pool = &mut self.pools[idx];

        let slot = if margin == NO_MARGIN {
            match pool.get(0) {
                Some(slot) => slot,
                None => q_error!(301),
            }
        } else {
            pool.get(margin as usize)?
        };

        let generation = pool.fill(slot, signal, payload);
        Some(EventRef::Pooled(PoolHandle {
            pool_id: idx as u8 + 1,
            slot,
            generation,
            signal,
        }))
    }

    /// Number of queues currently holding the event
    pub fn ref_count(&self, handle: PoolHandle) -> u8 {
        let pool = self.pool(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        pool.ref_count(handle.slot)
    }

    pub fn inc_ref(&mut self, handle: PoolHandle) -> u8 {
        let pool = self.pool_mut(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        pool.inc_ref(handle.slot)
    }

    /// Drops one reference. Returns `true` when the block went back to its pool.
    ///
    /// An event nobody holds (count 0 or 1) is released.
    pub fn dec_ref(&mut self, handle: PoolHandle) -> bool {
        let pool = self.pool_mut(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        if pool.ref_count(handle.slot) > 1 {
            pool.dec_ref(handle.slot);
            false
        } else {
            pool.put(handle.slot);
            true
        }
    }

    /// Decrements a reference that must not be the last one.
    pub fn dec_ref_held(&mut self, handle: PoolHandle) {
        let pool = self.pool_mut(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        q_require!(400, pool.ref_count(handle.slot) > 1);
        pool.dec_ref(handle.slot);
    }

    /// Returns the block to its pool regardless of the count.
    pub fn release(&mut self, handle: PoolHandle) {
        let pool = self.pool_mut(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        pool.put(handle.slot);
    }

    pub fn payload(&self, handle: PoolHandle) -> &[u8] {
        let pool = self.pool(handle.pool_id);
        pool.check(handle.slot, handle.generation);
        pool.payload(handle.slot)
    }

    pub fn stats(&self, pool_id: u8) -> PoolStats {
        self.pool(pool_id).stats()
    }
}
