//! Framework configuration

use alloc::sync::Arc;
use core::fmt;

use heapless::Vec;
use qp_core::{q_require, Hooks, NoHooks, MAX_ACTIVE, MAX_TICK_RATE};
use qp_mem::MAX_EVENT_POOLS;
use qp_qs::{TargetInfo, Tracer};

/// Size class of one event pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    pub block_size: usize,
    pub n_blocks: usize,
}

/// Sizing and collaborators of a [`Framework`](crate::Framework).
///
/// Everything here is fixed once the framework is built; a correctly sized
/// system never runs out of queue entries, pool blocks or priorities.
#[derive(Clone)]
pub struct FrameworkConfig {
    pub name: &'static str,
    /// Highest priority an active object or thread may use
    pub max_active: u8,
    /// Signals at or above this value cannot be published
    pub max_signal: u16,
    /// Number of independent clock tick rates
    pub tick_rates: u8,
    /// Event pools, in increasing block size
    pub pools: Vec<PoolSpec, MAX_EVENT_POOLS>,
    pub hooks: Arc<dyn Hooks>,
    pub tracer: Option<Arc<Tracer>>,
    pub version: u16,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            name: "QP",
            max_active: MAX_ACTIVE as u8,
            max_signal: 64,
            tick_rates: 1,
            pools: Vec::new(),
            hooks: Arc::new(NoHooks),
            tracer: None,
            version: 800,
        }
    }
}

impl fmt::Debug for FrameworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkConfig")
            .field("name", &self.name)
            .field("max_active", &self.max_active)
            .field("max_signal", &self.max_signal)
            .field("tick_rates", &self.tick_rates)
            .field("pools", &self.pools)
            .field("traced", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}

impl FrameworkConfig {
    pub fn builder() -> FrameworkConfigBuilder {
        FrameworkConfigBuilder::default()
    }

    /// Target description sent to `qspy` at start-up.
    pub fn to_target_info(&self) -> TargetInfo {
        TargetInfo {
            version: self.version,
            max_active: self.max_active,
            max_event_pools: MAX_EVENT_POOLS as u8,
            max_tick_rate: self.tick_rates,
            obj_ptr_size: core::mem::size_of::<u64>() as u8,
            fun_ptr_size: core::mem::size_of::<usize>() as u8,
            ..TargetInfo::default()
        }
    }

    pub(crate) fn validate(&self) {
        q_require!(100, self.max_active >= 1 && self.max_active as usize <= MAX_ACTIVE);
        q_require!(101, self.tick_rates >= 1 && self.tick_rates as usize <= MAX_TICK_RATE);
        q_require!(102, self.max_signal > qp_core::Signal::USER.raw());
    }
}

/// Fluent construction of a [`FrameworkConfig`].
#[derive(Default)]
pub struct FrameworkConfigBuilder {
    config: FrameworkConfig,
}

impl FrameworkConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    pub fn max_active(mut self, max: u8) -> Self {
        self.config.max_active = max;
        self
    }

    pub fn max_signal(mut self, max: u16) -> Self {
        self.config.max_signal = max;
        self
    }

    pub fn tick_rates(mut self, rates: u8) -> Self {
        self.config.tick_rates = rates;
        self
    }

    /// Adds an event pool. Pools must be added smallest block first.
    pub fn pool(mut self, block_size: usize, n_blocks: usize) -> Self {
        let spec = PoolSpec {
            block_size,
            n_blocks,
        };
        q_require!(200, self.config.pools.push(spec).is_ok());
        self
    }

    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.config.hooks = Arc::new(hooks);
        self
    }

    pub fn tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.config.tracer = Some(tracer);
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.config.version = version;
        self
    }

    pub fn build(self) -> FrameworkConfig {
        self.config
    }
}
