#![no_std]
#![forbid(unsafe_code)]

//! # QP Core
//!
//! Types shared by every layer of the framework: signals, priorities and the
//! priority ready-set, the fatal assertion path and the application hooks a
//! kernel invokes around its event loop.

use core::fmt;

pub mod assert;
pub mod hooks;
pub mod priorities;
pub mod signal;
pub mod time;

pub use assert::{on_assert, set_assert_handler, AssertHandler};
pub use hooks::{Hooks, NoHooks};
pub use priorities::*;
pub use signal::Signal;
pub use time::*;

/// QP framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the QP framework
pub type QResult<T> = Result<T, QError>;

/// Recoverable errors raised while validating framework parameters.
///
/// Broken runtime invariants never show up here; they go to [`on_assert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QError {
    /// Priority outside `1..=MAX_ACTIVE`
    InvalidPriority(u8),
    /// Signal is reserved or outside the configured range
    InvalidSignal(u16),
    /// Tick rate outside the configured range
    InvalidTickRate(u8),
}

impl fmt::Display for QError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QError::InvalidPriority(p) => {
                write!(f, "priority {p} outside 1..={MAX_ACTIVE}")
            }
            QError::InvalidSignal(s) => write!(f, "signal {s} is reserved or out of range"),
            QError::InvalidTickRate(r) => write!(f, "tick rate {r} out of range"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for QError {}

#[cfg(feature = "defmt")]
impl defmt::Format for QError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QError::InvalidPriority(p) => defmt::write!(fmt, "InvalidPriority({})", p),
            QError::InvalidSignal(s) => defmt::write!(fmt, "InvalidSignal({})", s),
            QError::InvalidTickRate(r) => defmt::write!(fmt, "InvalidTickRate({})", r),
        }
    }
}
