#![forbid(unsafe_code)]

//! # QP Framework (QF)
//!
//! The framework layer shared by the QV, QK and QXK kernels:
//!
//! - [`active`]: active objects, each a hierarchical state machine with a
//!   private queue and a unique priority
//! - [`framework`]: posting, dispatch, event pools, publish/subscribe and
//!   the scheduler lock, all behind one critical section
//! - [`time`]: per-rate lists of time events driven by [`Framework::tick`]
//! - [`defer`]: deferring events and recalling them later
//!
//! Events are immutable once posted. A pooled event carries a reference
//! count equal to the number of queues holding it and goes back to its pool
//! when the last consumer is done with it.
//!
//! ```rust
//! use qp_core::{priority, Signal};
//! use qp_qep::{Hsm, Outcome};
//! use qp_qf::{ActiveContext, Event, Framework, FrameworkConfig};
//!
//! struct Blinky {
//!     toggles: u32,
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum State {
//!     On,
//! }
//!
//! impl Hsm for Blinky {
//!     type State = State;
//!     type Event = Event;
//!     type Context = ActiveContext;
//!
//!     fn parent(_: State) -> Option<State> {
//!         None
//!     }
//!
//!     fn top_initial(&mut self, _ctx: &mut ActiveContext) -> State {
//!         State::On
//!     }
//!
//!     fn handle(&mut self, _ctx: &mut ActiveContext, _s: State, _e: &Event) -> Outcome<State> {
//!         self.toggles += 1;
//!         Outcome::Handled
//!     }
//! }
//!
//! let fw = Framework::new(FrameworkConfig::builder().pool(16, 4).build());
//! let ao = fw.start_active(priority!(1), 4, Blinky { toggles: 0 });
//! fw.post(priority!(1), fw.new_event(Signal::USER, &[1]));
//! while fw.dispatch(priority!(1)) {}
//! assert_eq!(ao.with(|b| b.toggles), 1);
//! ```

extern crate alloc;

pub mod active;
pub mod config;
pub mod defer;
pub mod error;
pub mod event;
pub mod framework;
pub mod queue;
pub mod ticker;
pub mod time;

mod trace;

pub use active::{ActiveContext, ActiveObject, ActiveObjectRef, ActiveRunnable};
pub use config::{FrameworkConfig, FrameworkConfigBuilder, PoolSpec};
pub use defer::DeferQueue;
pub use error::{DeferError, PostError};
pub use event::{Event, MAX_EVENT_PAYLOAD};
pub use framework::{Framework, SchedStatus};
pub use queue::EventQueue;
pub use ticker::{Ticker, TickerState};
pub use time::TimeEventId;

pub use qp_mem::{EventRef, NO_MARGIN};

#[cfg(test)]
mod tests;
