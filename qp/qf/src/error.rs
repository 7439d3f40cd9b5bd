//! Recoverable framework errors
//!
//! Only the operations that take an explicit margin report failure as a
//! value. Everything else treats resource exhaustion as fatal.

use qp_core::{Priority, Signal};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PostError {
    #[error("queue of priority {target} would drop below {margin} free entries posting {signal}")]
    QueueFull {
        target: u8,
        signal: Signal,
        margin: u16,
    },
}

impl PostError {
    pub(crate) fn queue_full(target: Priority, signal: Signal, margin: u16) -> Self {
        PostError::QueueFull {
            target: target.raw(),
            signal,
            margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeferError {
    #[error("defer queue full, {signal} not deferred")]
    Full { signal: Signal },
}
