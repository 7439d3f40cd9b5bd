#![no_std]
#![forbid(unsafe_code)]

//! # QP Event Processor (QEP)
//!
//! Hierarchical state machine engine implementing UML statecharts:
//! - entry and exit actions run along the path through the least common
//!   ancestor of source and target
//! - composite states drill into their default child through initial
//!   transitions until a leaf is reached
//! - events a state ignores bubble up to its parent
//! - internal transitions run no entry or exit action, external
//!   self-transitions exit and re-enter the state
//!
//! The state topology is data: [`Hsm::parent`] maps every state to its
//! superstate, and the processor walks those links. Guards are ordinary
//! code in [`Hsm::handle`].

use core::fmt;

pub mod hsm;
pub mod transition;

pub use hsm::StateMachine;
pub use transition::{child_state, Step};

#[cfg(test)]
#[path = "tests/hsm_test.rs"]
mod tests;

/// Maximum nesting depth for hierarchical states.
///
/// Deeper hierarchies, and parent links that loop, are reported as
/// illegal transitions.
pub const MAX_NEST_DEPTH: usize = 8;

/// What a state handler decided about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    /// Consumed without changing state (internal transition)
    Handled,
    /// Not interesting to this state; offer it to the parent
    Ignored,
    /// External transition to the given state
    Transition(S),
}

/// What [`StateMachine::dispatch`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched<S> {
    /// Handled internally by `by`
    Handled { by: S },
    /// No state in the active configuration wanted the event
    Ignored,
    /// `source` took a transition to `target`
    Transitioned { source: S, target: S },
}

/// A hierarchical state machine definition.
///
/// `State` is normally a fieldless enum. The processor owns the current
/// state; implementors keep only their extended state variables.
pub trait Hsm {
    type State: Copy + Eq + fmt::Debug;
    type Event: ?Sized;
    type Context: ?Sized;

    /// Superstate of `state`, `None` for states directly below the top.
    fn parent(state: Self::State) -> Option<Self::State>;

    /// Target of the top-most initial transition.
    fn top_initial(&mut self, ctx: &mut Self::Context) -> Self::State;

    fn entry(&mut self, _ctx: &mut Self::Context, _state: Self::State) {}

    fn exit(&mut self, _ctx: &mut Self::Context, _state: Self::State) {}

    /// Default child of a composite state, `None` for leaves.
    fn initial(&mut self, _ctx: &mut Self::Context, _state: Self::State) -> Option<Self::State> {
        None
    }

    fn handle(
        &mut self,
        ctx: &mut Self::Context,
        state: Self::State,
        event: &Self::Event,
    ) -> Outcome<Self::State>;
}
