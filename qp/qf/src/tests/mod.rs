use std::sync::Arc;

use parking_lot::Mutex;
use qp_core::Signal;
use qp_qep::{Hsm, Outcome};

use crate::{ActiveContext, Event, Framework, FrameworkConfig};

mod publish;
mod time;

pub(crate) const PING: Signal = Signal(Signal::USER.0);
pub(crate) const PONG: Signal = Signal(Signal::USER.0 + 1);
pub(crate) const TICK: Signal = Signal(Signal::USER.0 + 2);
pub(crate) const TIMEOUT: Signal = Signal(Signal::USER.0 + 3);

pub(crate) type Log = Arc<Mutex<Vec<(u8, Signal)>>>;

/// Records every event it gets as `(priority, signal)`.
pub(crate) struct Recorder {
    log: Log,
    subscriptions: Vec<Signal>,
}

impl Recorder {
    pub(crate) fn new(log: &Log) -> Self {
        Self {
            log: Arc::clone(log),
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn subscribed(mut self, signal: Signal) -> Self {
        self.subscriptions.push(signal);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecState {
    Listening,
}

impl Hsm for Recorder {
    type State = RecState;
    type Event = Event;
    type Context = ActiveContext;

    fn parent(_state: RecState) -> Option<RecState> {
        None
    }

    fn top_initial(&mut self, ctx: &mut ActiveContext) -> RecState {
        for sig in &self.subscriptions {
            ctx.subscribe(*sig);
        }
        RecState::Listening
    }

    fn handle(
        &mut self,
        ctx: &mut ActiveContext,
        _state: RecState,
        e: &Event,
    ) -> Outcome<RecState> {
        self.log.lock().push((ctx.me().raw(), e.signal()));
        Outcome::Handled
    }
}

pub(crate) fn framework() -> Arc<Framework> {
    let _ = env_logger::builder().is_test(true).try_init();
    Framework::new(
        FrameworkConfig::builder()
            .name("test")
            .max_signal(32)
            .tick_rates(2)
            .pool(8, 4)
            .pool(32, 2)
            .build(),
    )
}

/// Dispatches until nothing is ready, highest priority first.
pub(crate) fn run(fw: &Arc<Framework>) -> usize {
    let mut n = 0;
    while let Some(prio) = fw.next_ready(0) {
        fw.dispatch(prio);
        n += 1;
    }
    n
}

pub(crate) fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}
