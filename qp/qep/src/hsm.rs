//! Hierarchical state machine execution

use qp_core::{q_assert, q_require};

use crate::transition::{self, Step};
use crate::{Dispatched, Hsm, Outcome};

/// Runs an [`Hsm`] definition: tracks the current leaf state and performs
/// run-to-completion dispatch with hierarchical transitions.
pub struct StateMachine<H: Hsm> {
    hsm: H,
    state: Option<H::State>,
}

impl<H: Hsm> StateMachine<H> {
    pub const fn new(hsm: H) -> Self {
        Self { hsm, state: None }
    }

    /// Takes the top-most initial transition and drills down to a leaf.
    pub fn init(&mut self, ctx: &mut H::Context) -> H::State {
        self.init_with(ctx, &mut |_| {})
    }

    /// [`init`](Self::init) reporting every entry and initial step.
    pub fn init_with(
        &mut self,
        ctx: &mut H::Context,
        observer: &mut dyn FnMut(Step<H::State>),
    ) -> H::State {
        q_require!(100, self.state.is_none());

        let target = self.hsm.top_initial(ctx);
        let path = transition::ancestry::<H>(target);
        for s in path.iter().rev() {
            self.hsm.entry(ctx, *s);
            observer(Step::Entry(*s));
        }
        let leaf = self.drill(ctx, target, observer);
        self.state = Some(leaf);
        leaf
    }

    /// Processes one event to completion.
    pub fn dispatch(&mut self, ctx: &mut H::Context, event: &H::Event) -> Dispatched<H::State> {
        self.dispatch_with(ctx, event, &mut |_| {})
    }

    /// [`dispatch`](Self::dispatch) reporting every entry, exit and
    /// initial step.
    pub fn dispatch_with(
        &mut self,
        ctx: &mut H::Context,
        event: &H::Event,
        observer: &mut dyn FnMut(Step<H::State>),
    ) -> Dispatched<H::State> {
        let current = self.state();

        // bubble the event up until some state takes it
        let mut cursor = Some(current);
        let mut depth = 0;
        let (source, target) = loop {
            let Some(s) = cursor else {
                return Dispatched::Ignored;
            };
            depth += 1;
            q_assert!(200, depth <= crate::MAX_NEST_DEPTH);
            match self.hsm.handle(ctx, s, event) {
                Outcome::Handled => return Dispatched::Handled { by: s },
                Outcome::Ignored => cursor = H::parent(s),
                Outcome::Transition(t) => break (s, t),
            }
        };

        // leave the substates of the handling state first
        let mut s = current;
        while s != source {
            self.hsm.exit(ctx, s);
            observer(Step::Exit(s));
            match H::parent(s) {
                Some(p) => s = p,
                None => qp_core::q_error!(201),
            }
        }

        let path = transition::compute::<H>(source, target);
        for s in path.exits.iter() {
            self.hsm.exit(ctx, *s);
            observer(Step::Exit(*s));
        }
        for s in path.entries.iter().rev() {
            self.hsm.entry(ctx, *s);
            observer(Step::Entry(*s));
        }

        let leaf = self.drill(ctx, target, observer);
        self.state = Some(leaf);
        Dispatched::Transitioned { source, target }
    }

    /// Follows initial transitions from `state` until a leaf is reached.
    fn drill(
        &mut self,
        ctx: &mut H::Context,
        mut state: H::State,
        observer: &mut dyn FnMut(Step<H::State>),
    ) -> H::State {
        while let Some(child) = self.hsm.initial(ctx, state) {
            observer(Step::Init {
                from: state,
                to: child,
            });
            let path = transition::descend::<H>(state, child);
            for s in path.iter().rev() {
                self.hsm.entry(ctx, *s);
                observer(Step::Entry(*s));
            }
            state = child;
        }
        state
    }

    /// Current leaf state. The machine has to be initialized.
    pub fn state(&self) -> H::State {
        match self.state {
            Some(s) => s,
            None => qp_core::q_error!(300),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// True when `state` is the current state or one of its superstates.
    pub fn is_in(&self, state: H::State) -> bool {
        let mut cursor = self.state;
        while let Some(s) = cursor {
            if s == state {
                return true;
            }
            cursor = H::parent(s);
        }
        false
    }

    /// Direct child of `parent` in the current configuration; see
    /// [`transition::child_state`]. Fatal when `parent` is not active.
    pub fn child_state(&self, parent: H::State) -> H::State {
        transition::child_state::<H>(self.state(), parent)
    }

    pub fn inner(&self) -> &H {
        &self.hsm
    }

    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.hsm
    }
}
