//! Clock ticks processed in task context

use qp_core::Signal;
use qp_qep::{Hsm, Outcome};

use crate::active::ActiveContext;
use crate::event::Event;

/// Active object that runs [`Framework::tick`](crate::Framework::tick) for
/// one rate every time it receives an event.
///
/// An interrupt then only posts a static event to the ticker instead of
/// walking the timer lists itself. Start it at a priority above every
/// active object whose timeouts it serves.
pub struct Ticker {
    rate: u8,
    ticks: u64,
}

impl Ticker {
    pub fn new(rate: u8) -> Self {
        Self { rate, ticks: 0 }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    Ticking,
}

impl Hsm for Ticker {
    type State = TickerState;
    type Event = Event;
    type Context = ActiveContext;

    fn parent(_state: TickerState) -> Option<TickerState> {
        None
    }

    fn top_initial(&mut self, _ctx: &mut ActiveContext) -> TickerState {
        TickerState::Ticking
    }

    fn handle(
        &mut self,
        ctx: &mut ActiveContext,
        _state: TickerState,
        e: &Event,
    ) -> Outcome<TickerState> {
        if e.signal() < Signal::USER {
            return Outcome::Ignored;
        }
        self.ticks += 1;
        ctx.framework().tick(self.rate);
        Outcome::Handled
    }
}
