//! Active objects
//!
//! An active object pairs a hierarchical state machine with a private
//! event queue and a unique priority. The framework owns the queue; the
//! object itself only knows how to start its machine and how to run one
//! event to completion.

use alloc::sync::Arc;

use parking_lot::Mutex;
use qp_core::{Priority, Signal};
use qp_mem::EventRef;
use qp_qep::{Hsm, StateMachine};

use crate::error::PostError;
use crate::event::Event;
use crate::trace;
use crate::Framework;

/// Per-dispatch context passed to state handlers.
///
/// Gives a handler access to the framework on behalf of the active object
/// that is currently running.
pub struct ActiveContext {
    fw: Arc<Framework>,
    me: Priority,
    current: Option<EventRef>,
}

impl ActiveContext {
    pub(crate) fn new(fw: Arc<Framework>, me: Priority, current: Option<EventRef>) -> Self {
        Self { fw, me, current }
    }

    /// Priority of the running active object
    pub fn me(&self) -> Priority {
        self.me
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.fw
    }

    /// Handle of the event being dispatched, `None` during the initial
    /// transition. Needed to defer the event.
    pub fn current_event(&self) -> Option<EventRef> {
        self.current
    }

    pub fn post(&self, target: Priority, e: EventRef) {
        self.fw.post(target, e);
    }

    pub fn post_x(&self, target: Priority, e: EventRef, margin: u16) -> Result<(), PostError> {
        self.fw.post_x(target, e, margin)
    }

    /// Posts to this active object's own queue.
    pub fn post_self(&self, e: EventRef) {
        self.fw.post(self.me, e);
    }

    pub fn publish(&self, e: EventRef) {
        self.fw.publish(e);
    }

    pub fn subscribe(&self, signal: Signal) {
        self.fw.subscribe(self.me, signal);
    }

    pub fn unsubscribe(&self, signal: Signal) {
        self.fw.unsubscribe(self.me, signal);
    }

    pub fn new_event(&self, signal: Signal, payload: &[u8]) -> EventRef {
        self.fw.new_event(signal, payload)
    }
}

/// Object-safe interface the framework and the kernels drive.
pub trait ActiveRunnable: Send + Sync {
    fn priority(&self) -> Priority;

    fn name(&self) -> &'static str;

    /// Runs the top-most initial transition.
    fn start(&self, ctx: &mut ActiveContext);

    /// Processes one event to completion.
    fn dispatch(&self, ctx: &mut ActiveContext, event: &Event);
}

pub type ActiveObjectRef = Arc<dyn ActiveRunnable>;

/// Active object running the state machine `H`.
pub struct ActiveObject<H: Hsm> {
    priority: Priority,
    name: &'static str,
    sm: Mutex<StateMachine<H>>,
}

impl<H> ActiveObject<H>
where
    H: Hsm<Event = Event, Context = ActiveContext> + Send + 'static,
    H::State: Send,
{
    pub fn new(priority: Priority, hsm: H) -> Arc<Self> {
        let name = core::any::type_name::<H>();
        let name = name.rsplit("::").next().unwrap_or(name);
        Arc::new(Self {
            priority,
            name,
            sm: Mutex::new(StateMachine::new(hsm)),
        })
    }

    /// Current leaf state
    pub fn state(&self) -> H::State {
        self.sm.lock().state()
    }

    pub fn is_in(&self, state: H::State) -> bool {
        self.sm.lock().is_in(state)
    }

    /// Runs `f` on the machine's extended state.
    ///
    /// Must not be called from the object's own handlers.
    pub fn with<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(self.sm.lock().inner())
    }
}

impl<H> ActiveRunnable for ActiveObject<H>
where
    H: Hsm<Event = Event, Context = ActiveContext> + Send + 'static,
    H::State: Send,
{
    fn priority(&self) -> Priority {
        self.priority
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&self, ctx: &mut ActiveContext) {
        let fw = Arc::clone(ctx.framework());
        let me = self.priority.raw();
        let mut sm = self.sm.lock();
        let leaf = sm.init_with(ctx, &mut |step| trace::qep_step(&fw, me, step));
        trace::qep_init(&fw, me, leaf);
    }

    fn dispatch(&self, ctx: &mut ActiveContext, event: &Event) {
        let fw = Arc::clone(ctx.framework());
        let me = self.priority.raw();
        let mut sm = self.sm.lock();
        trace::qep_dispatch(&fw, me, event.signal(), sm.state());
        let result = sm.dispatch_with(ctx, event, &mut |step| trace::qep_step(&fw, me, step));
        trace::qep_result(&fw, me, event.signal(), result);
    }
}
