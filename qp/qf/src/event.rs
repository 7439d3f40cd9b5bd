//! Events as seen by state handlers

use core::fmt;

use heapless::Vec;
use qp_core::{q_error, Signal};
use qp_mem::{EventRef, PoolSet};

/// Largest payload an event may carry, pooled or static.
pub const MAX_EVENT_PAYLOAD: usize = 128;

/// An event handed to a state machine.
///
/// The framework copies the payload out of its pool block before the
/// handler runs, so the handler never touches pool storage and the block
/// can be recycled as soon as the dispatch completes.
#[derive(Clone, PartialEq, Eq)]
pub struct Event {
    signal: Signal,
    pool_id: u8,
    payload: Vec<u8, MAX_EVENT_PAYLOAD>,
}

impl Event {
    /// An event without payload, mostly useful in tests.
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            pool_id: 0,
            payload: Vec::new(),
        }
    }

    pub(crate) fn load(e: EventRef, pools: &PoolSet) -> Self {
        let bytes = match e {
            EventRef::Static { payload, .. } => payload,
            EventRef::Pooled(handle) => pools.payload(handle),
        };
        let Ok(payload) = Vec::from_slice(bytes) else {
            q_error!(100)
        };
        Self {
            signal: e.signal(),
            pool_id: e.pool_id(),
            payload,
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Pool the event came from, `0` for static events
    pub fn pool_id(&self) -> u8 {
        self.pool_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// First payload byte, the usual home of a small parameter.
    pub fn param(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("signal", &self.signal)
            .field("pool_id", &self.pool_id)
            .field("len", &self.payload.len())
            .finish()
    }
}
