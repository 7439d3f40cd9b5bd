//! State machine tests for qp-qep

extern crate std;

use std::vec;
use std::vec::Vec;

use crate::{child_state, Dispatched, Hsm, Outcome, StateMachine, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum S {
    Root,
    A,
    A1,
    A2,
    B,
    B1,
}

#[derive(Debug, Clone, Copy)]
enum Ev {
    /// A1 -> B1
    Cross,
    /// external self-transition on A1
    Again,
    /// internal transition in A1
    Poke,
    /// handled by A for any substate
    Bump,
    /// B1 -> A (drills to A1)
    Back,
    /// A1 -> Root, guarded by `allow`
    Reset { allow: bool },
    /// nobody cares
    Noise,
}

#[derive(Default)]
struct Demo {
    pokes: u32,
    bumps: u32,
    /// A's initial transition picks A2 instead of A1
    prefer_a2: bool,
}

type Log = Vec<Step<S>>;

impl Hsm for Demo {
    type State = S;
    type Event = Ev;
    type Context = Log;

    fn parent(state: S) -> Option<S> {
        match state {
            S::Root => None,
            S::A | S::B => Some(S::Root),
            S::A1 | S::A2 => Some(S::A),
            S::B1 => Some(S::B),
        }
    }

    fn top_initial(&mut self, _log: &mut Log) -> S {
        S::Root
    }

    fn entry(&mut self, log: &mut Log, state: S) {
        log.push(Step::Entry(state));
    }

    fn exit(&mut self, log: &mut Log, state: S) {
        log.push(Step::Exit(state));
    }

    fn initial(&mut self, _log: &mut Log, state: S) -> Option<S> {
        match state {
            S::Root => Some(S::A1),
            S::A if self.prefer_a2 => Some(S::A2),
            S::A => Some(S::A1),
            S::B => Some(S::B1),
            _ => None,
        }
    }

    fn handle(&mut self, _log: &mut Log, state: S, event: &Ev) -> Outcome<S> {
        match (state, event) {
            (S::A1, Ev::Cross) => Outcome::Transition(S::B1),
            (S::A1, Ev::Again) => Outcome::Transition(S::A1),
            (S::A1, Ev::Poke) => {
                self.pokes += 1;
                Outcome::Handled
            }
            (S::A1, Ev::Reset { allow: true }) => Outcome::Transition(S::Root),
            (S::A, Ev::Bump) => {
                self.bumps += 1;
                Outcome::Handled
            }
            (S::B1, Ev::Back) => Outcome::Transition(S::A),
            _ => Outcome::Ignored,
        }
    }
}

fn started() -> (StateMachine<Demo>, Log) {
    let mut log = Log::new();
    let mut sm = StateMachine::new(Demo::default());
    sm.init(&mut log);
    log.clear();
    (sm, log)
}

#[test]
fn init_enters_every_level_top_down() {
    let mut log = Log::new();
    let mut sm = StateMachine::new(Demo::default());
    assert!(!sm.is_initialized());

    let leaf = sm.init(&mut log);
    assert_eq!(leaf, S::A1);
    assert_eq!(log, vec![Step::Entry(S::Root), Step::Entry(S::A), Step::Entry(S::A1)]);
    assert!(sm.is_in(S::A));
    assert!(sm.is_in(S::Root));
    assert!(!sm.is_in(S::B));
}

#[test]
fn cross_branch_transition_goes_through_lca() {
    let (mut sm, mut log) = started();

    let r = sm.dispatch(&mut log, &Ev::Cross);
    assert_eq!(r, Dispatched::Transitioned { source: S::A1, target: S::B1 });
    assert_eq!(
        log,
        vec![Step::Exit(S::A1), Step::Exit(S::A), Step::Entry(S::B), Step::Entry(S::B1)]
    );
    assert_eq!(sm.state(), S::B1);
}

#[test]
fn external_self_transition_exits_and_reenters() {
    let (mut sm, mut log) = started();

    sm.dispatch(&mut log, &Ev::Again);
    assert_eq!(log, vec![Step::Exit(S::A1), Step::Entry(S::A1)]);
    assert_eq!(sm.state(), S::A1);
}

#[test]
fn internal_transition_runs_no_actions() {
    let (mut sm, mut log) = started();

    let r = sm.dispatch(&mut log, &Ev::Poke);
    assert_eq!(r, Dispatched::Handled { by: S::A1 });
    assert!(log.is_empty());
    assert_eq!(sm.inner().pokes, 1);
    assert_eq!(sm.state(), S::A1);
}

#[test]
fn unhandled_event_bubbles_to_parent() {
    let (mut sm, mut log) = started();

    let r = sm.dispatch(&mut log, &Ev::Bump);
    assert_eq!(r, Dispatched::Handled { by: S::A });
    assert_eq!(sm.inner().bumps, 1);
    assert!(log.is_empty());

    assert_eq!(sm.dispatch(&mut log, &Ev::Noise), Dispatched::Ignored);
    assert_eq!(sm.state(), S::A1);
}

#[test]
fn transition_into_composite_drills_through_initial() {
    let (mut sm, mut log) = started();
    sm.dispatch(&mut log, &Ev::Cross);
    log.clear();

    sm.inner_mut().prefer_a2 = true;
    let mut steps = Vec::new();
    sm.dispatch_with(&mut log, &Ev::Back, &mut |step| steps.push(step));

    assert_eq!(
        log,
        vec![Step::Exit(S::B1), Step::Exit(S::B), Step::Entry(S::A), Step::Entry(S::A2)]
    );
    assert!(steps.contains(&Step::Init { from: S::A, to: S::A2 }));
    assert_eq!(sm.state(), S::A2);
}

#[test]
fn transition_to_ancestor_leaves_it_entered() {
    let (mut sm, mut log) = started();

    sm.dispatch(&mut log, &Ev::Reset { allow: true });
    // Root stays active; its initial transition re-enters A and A1
    assert_eq!(
        log,
        vec![Step::Exit(S::A1), Step::Exit(S::A), Step::Entry(S::A), Step::Entry(S::A1)]
    );
    assert_eq!(sm.state(), S::A1);
}

#[test]
fn guard_false_falls_through() {
    let (mut sm, mut log) = started();

    assert_eq!(sm.dispatch(&mut log, &Ev::Reset { allow: false }), Dispatched::Ignored);
    assert!(log.is_empty());
}

#[test]
fn handled_by_ancestor_exits_substates_before_transition() {
    struct Nested;

    impl Hsm for Nested {
        type State = S;
        type Event = ();
        type Context = Log;

        fn parent(state: S) -> Option<S> {
            Demo::parent(state)
        }

        fn top_initial(&mut self, _log: &mut Log) -> S {
            S::A1
        }

        fn entry(&mut self, log: &mut Log, state: S) {
            log.push(Step::Entry(state));
        }

        fn exit(&mut self, log: &mut Log, state: S) {
            log.push(Step::Exit(state));
        }

        fn handle(&mut self, _log: &mut Log, state: S, _event: &()) -> Outcome<S> {
            match state {
                S::A => Outcome::Transition(S::B1),
                _ => Outcome::Ignored,
            }
        }
    }

    let mut log = Log::new();
    let mut sm = StateMachine::new(Nested);
    sm.init(&mut log);
    log.clear();

    let r = sm.dispatch(&mut log, &());
    assert_eq!(r, Dispatched::Transitioned { source: S::A, target: S::B1 });
    assert_eq!(
        log,
        vec![Step::Exit(S::A1), Step::Exit(S::A), Step::Entry(S::B), Step::Entry(S::B1)]
    );
}

#[test]
fn child_state_walks_the_active_path() {
    let (sm, _log) = started();

    assert_eq!(sm.child_state(S::Root), S::A);
    assert_eq!(sm.child_state(S::A), S::A1);
    // the leaf is its own child
    assert_eq!(sm.child_state(S::A1), S::A1);
}

#[test]
#[should_panic(expected = "assertion failed")]
fn child_state_of_inactive_state_is_fatal() {
    let (sm, _log) = started();
    sm.child_state(S::B);
}

#[test]
fn exit_action_records_history_for_the_next_entry() {
    /// Goes back to whichever substate of A it left last.
    #[derive(Default)]
    struct Remembering {
        leaf: Option<S>,
        history: Option<S>,
    }

    impl Hsm for Remembering {
        type State = S;
        type Event = Ev;
        type Context = Log;

        fn parent(state: S) -> Option<S> {
            Demo::parent(state)
        }

        fn top_initial(&mut self, _log: &mut Log) -> S {
            S::A2
        }

        fn entry(&mut self, _log: &mut Log, state: S) {
            self.leaf = Some(state);
        }

        fn exit(&mut self, log: &mut Log, state: S) {
            log.push(Step::Exit(state));
            if let (S::A, Some(leaf)) = (state, self.leaf) {
                self.history = Some(child_state::<Self>(leaf, S::A));
            }
        }

        fn initial(&mut self, _log: &mut Log, state: S) -> Option<S> {
            match state {
                S::A => Some(self.history.unwrap_or(S::A1)),
                S::B => Some(S::B1),
                _ => None,
            }
        }

        fn handle(&mut self, _log: &mut Log, state: S, event: &Ev) -> Outcome<S> {
            match (state, event) {
                (S::A, Ev::Cross) => Outcome::Transition(S::B1),
                (S::B1, Ev::Back) => Outcome::Transition(S::A),
                _ => Outcome::Ignored,
            }
        }
    }

    let mut log = Log::new();
    let mut sm = StateMachine::new(Remembering::default());
    assert_eq!(sm.init(&mut log), S::A2);

    sm.dispatch(&mut log, &Ev::Cross);
    assert_eq!(log, vec![Step::Exit(S::A2), Step::Exit(S::A)]);
    assert_eq!(sm.state(), S::B1);
    assert_eq!(sm.inner().history, Some(S::A2));

    // A's initial transition now follows the history, not its default
    sm.dispatch(&mut log, &Ev::Back);
    assert_eq!(sm.state(), S::A2);
}

#[test]
#[should_panic(expected = "assertion failed")]
fn initial_target_outside_substates_is_fatal() {
    struct Broken;

    impl Hsm for Broken {
        type State = S;
        type Event = ();
        type Context = ();

        fn parent(state: S) -> Option<S> {
            Demo::parent(state)
        }

        fn top_initial(&mut self, _ctx: &mut ()) -> S {
            S::A
        }

        fn initial(&mut self, _ctx: &mut (), state: S) -> Option<S> {
            // B1 is not below A
            (state == S::A).then_some(S::B1)
        }

        fn handle(&mut self, _ctx: &mut (), _state: S, _event: &()) -> Outcome<S> {
            Outcome::Ignored
        }
    }

    let mut sm = StateMachine::new(Broken);
    sm.init(&mut ());
}

#[test]
#[should_panic(expected = "assertion failed")]
fn cyclic_topology_is_fatal() {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Loop {
        X,
        Y,
    }

    struct Cycle;

    impl Hsm for Cycle {
        type State = Loop;
        type Event = ();
        type Context = ();

        fn parent(state: Loop) -> Option<Loop> {
            match state {
                Loop::X => Some(Loop::Y),
                Loop::Y => Some(Loop::X),
            }
        }

        fn top_initial(&mut self, _ctx: &mut ()) -> Loop {
            Loop::X
        }

        fn handle(&mut self, _ctx: &mut (), _state: Loop, _event: &()) -> Outcome<Loop> {
            Outcome::Ignored
        }
    }

    let mut sm = StateMachine::new(Cycle);
    sm.init(&mut ());
}
