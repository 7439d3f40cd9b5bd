//! Transition path computation

use heapless::Vec;
use qp_core::{q_assert, q_error};

use crate::{Hsm, MAX_NEST_DEPTH};

/// Chain of states from a state up to the top, the state itself first.
pub(crate) type Ancestry<S> = Vec<S, MAX_NEST_DEPTH>;

/// One action the processor performed, reported to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    Entry(S),
    Exit(S),
    /// Initial transition from a composite state into its default child
    Init { from: S, to: S },
}

/// Collects `state` and all of its superstates.
pub(crate) fn ancestry<H: Hsm>(state: H::State) -> Ancestry<H::State> {
    let mut chain = Ancestry::new();
    let mut cursor = Some(state);
    while let Some(s) = cursor {
        if chain.push(s).is_err() {
            // nesting too deep, or the parent links form a cycle
            qp_core::q_error!(100);
        }
        cursor = H::parent(s);
    }
    chain
}

/// Exit and entry lists of an external transition from `source` to `target`.
///
/// Exits run child-first, entries parent-first (`entries` is stored
/// child-first and must be walked in reverse).
pub(crate) struct TransitionPath<S> {
    pub exits: Vec<S, MAX_NEST_DEPTH>,
    pub entries: Vec<S, MAX_NEST_DEPTH>,
}

pub(crate) fn compute<H: Hsm>(source: H::State, target: H::State) -> TransitionPath<H::State> {
    let mut exits = Vec::new();
    let mut entries = Vec::new();

    if source == target {
        // external self-transition
        let _ = exits.push(source);
        let _ = entries.push(target);
        return TransitionPath { exits, entries };
    }

    let src = ancestry::<H>(source);
    let tgt = ancestry::<H>(target);

    // a state counts as its own ancestor here, so when the target
    // encloses the source it becomes the LCA and is left alone
    let lca = src
        .iter()
        .enumerate()
        .find_map(|(i, s)| tgt.iter().position(|t| t == s).map(|j| (i, j)));

    let (n_exit, n_entry) = match lca {
        Some((i, j)) => (i, j),
        // no shared ancestor: the implicit top state is the LCA
        None => (src.len(), tgt.len()),
    };

    for s in &src[..n_exit] {
        let _ = exits.push(*s);
    }
    for s in &tgt[..n_entry] {
        let _ = entries.push(*s);
    }
    TransitionPath { exits, entries }
}

/// Entry path from just below `from` down to `to`, child-first.
///
/// `to` has to be a proper descendant of `from`.
pub(crate) fn descend<H: Hsm>(from: H::State, to: H::State) -> Ancestry<H::State> {
    let mut chain = ancestry::<H>(to);
    let pos = chain.iter().position(|s| *s == from);
    q_assert!(200, matches!(pos, Some(p) if p > 0));
    if let Some(p) = pos {
        chain.truncate(p);
    }
    chain
}

/// Direct child of `parent` on the path from `leaf` to the top, or `leaf`
/// itself when it is `parent`.
///
/// Exit actions use it to remember history before a composite state is
/// left. `parent` has to be `leaf` or one of its superstates.
pub fn child_state<H: Hsm>(leaf: H::State, parent: H::State) -> H::State {
    let chain = ancestry::<H>(leaf);
    match chain.iter().position(|s| *s == parent) {
        Some(0) => leaf,
        Some(i) => chain[i - 1],
        None => q_error!(810),
    }
}
