#![forbid(unsafe_code)]

//! # QXK dual-mode kernel
//!
//! QXK runs two kinds of schedulable entities in one priority space:
//!
//! - **Active objects**, exactly as under QK: run-to-completion dispatch,
//!   preempted only by higher-priority work made ready in an interrupt.
//! - **Extended threads**, sequential code that may block in
//!   [`ThreadContext::delay`], [`ThreadContext::queue_get`],
//!   [`Semaphore::wait`] or [`Mutex::lock`].
//!
//! The highest ready entity always runs next. A thread is a future polled
//! by the kernel: it runs until its next blocking call, and the blocking
//! call returns to the scheduler. Timeouts are counted in ticks of rate 0.
//!
//! ```rust
//! use std::sync::Arc;
//! use qp_core::priority;
//! use qp_qf::{Framework, FrameworkConfig};
//! use qp_qxk::QxkKernel;
//!
//! let fw = Framework::new(FrameworkConfig::default());
//! let kernel = QxkKernel::new(Arc::clone(&fw));
//! kernel.start_thread(priority!(3), 4, |ctx| async move {
//!     ctx.delay(2).await;
//! });
//!
//! kernel.run_until_idle();
//! fw.tick(0);
//! fw.tick(0);
//! kernel.run_until_idle();
//! assert!(!fw.is_registered(priority!(3)));
//! ```

mod kernel;
pub mod primitives;
pub mod thread;

pub use kernel::QxkKernel;
pub use primitives::{Mutex, Semaphore, SyncError};
pub use thread::ThreadContext;
