#![forbid(unsafe_code)]

//! # QK preemptive kernel
//!
//! Fixed-priority, run-to-completion preemption. An interrupt that makes a
//! higher-priority active object ready gets it running as soon as the
//! outermost interrupt returns, nested on top of the dispatch it
//! interrupted. Events posted from task level never preempt the poster;
//! they are picked up when the current dispatch returns.
//!
//! On host the "CPU" is a reentrant lock: an [`isr`](QkKernel::isr) entered
//! from inside a handler preempts that handler on the same stack, while one
//! entered from another OS thread waits for the kernel to leave its current
//! activation.

mod kernel;

pub use kernel::QkKernel;
