//! Event handles

use core::fmt;
use qp_core::Signal;

/// Handle to a block inside one of the event pools.
///
/// The generation changes every time the block is handed out, so a handle
/// kept past the event's release is detected instead of aliasing the next
/// event stored in the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub(crate) pool_id: u8,
    pub(crate) slot: u16,
    pub(crate) generation: u16,
    pub(crate) signal: Signal,
}

impl PoolHandle {
    /// 1-based id of the pool that owns the block
    pub const fn pool_id(&self) -> u8 {
        self.pool_id
    }

    pub const fn slot(&self) -> u16 {
        self.slot
    }

    pub const fn generation(&self) -> u16 {
        self.generation
    }
}

/// Reference to an immutable event, as stored in event queues.
///
/// Static events live for the whole program and are never counted. Pooled
/// events point into a [`PoolSet`](crate::PoolSet) block whose reference
/// count tracks how many queues still hold it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum EventRef {
    Static {
        signal: Signal,
        payload: &'static [u8],
    },
    Pooled(PoolHandle),
}

impl EventRef {
    /// Static event without payload
    pub const fn from_signal(signal: Signal) -> Self {
        EventRef::Static {
            signal,
            payload: &[],
        }
    }

    /// Static event with a payload baked into the program image.
    ///
    /// Posting one whose payload is longer than `qp_qf::MAX_EVENT_PAYLOAD`
    /// is a precondition failure.
    pub const fn from_static(signal: Signal, payload: &'static [u8]) -> Self {
        EventRef::Static { signal, payload }
    }

    pub const fn signal(&self) -> Signal {
        match self {
            EventRef::Static { signal, .. } => *signal,
            EventRef::Pooled(handle) => handle.signal,
        }
    }

    /// Originating pool, `0` for static events
    pub const fn pool_id(&self) -> u8 {
        match self {
            EventRef::Static { .. } => 0,
            EventRef::Pooled(handle) => handle.pool_id,
        }
    }

    pub const fn is_static(&self) -> bool {
        matches!(self, EventRef::Static { .. })
    }

    pub const fn pooled(&self) -> Option<PoolHandle> {
        match self {
            EventRef::Static { .. } => None,
            EventRef::Pooled(handle) => Some(*handle),
        }
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRef::Static { signal, payload } => f
                .debug_struct("Static")
                .field("signal", signal)
                .field("len", &payload.len())
                .finish(),
            EventRef::Pooled(h) => write!(
                f,
                "Pooled({} pool={} slot={} gen={})",
                h.signal, h.pool_id, h.slot, h.generation
            ),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventRef {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            EventRef::Static { signal, .. } => defmt::write!(fmt, "Static({})", signal),
            EventRef::Pooled(h) => {
                defmt::write!(fmt, "Pooled({} pool={} slot={})", h.signal, h.pool_id, h.slot)
            }
        }
    }
}
