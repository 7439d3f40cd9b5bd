//! Tick-rate and time-event counter types

use core::fmt;
use crate::{QError, QResult};

/// Number of independent tick rates the framework supports
pub const MAX_TICK_RATE: usize = 4;

/// Time event down-counter, in ticks of its rate
pub type TickCtr = u32;

/// Identifies one of the clock tick rates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickRate(u8);

impl TickRate {
    /// The default (fastest) tick rate
    pub const DEFAULT: TickRate = TickRate(0);

    pub fn new(rate: u8) -> QResult<Self> {
        if rate as usize >= MAX_TICK_RATE {
            Err(QError::InvalidTickRate(rate))
        } else {
            Ok(TickRate(rate))
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TickRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TickRate {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "rate{}", self.0);
    }
}
