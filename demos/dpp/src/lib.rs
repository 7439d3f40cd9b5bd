//! Dining philosophers
//!
//! Five philosophers sit around a table with a fork between each pair of
//! neighbours. A philosopher thinks, gets hungry, asks the table for both
//! forks, eats and puts the forks back. The table hands out forks so that
//! no two neighbours eat at the same time.
//!
//! Philosophers are plain active objects with a private time event; the
//! table owns the forks and publishes `EAT` to every philosopher when one
//! of them may start eating.

use std::sync::Arc;

use parking_lot::Mutex;
use qp_core::{priority, Priority, Signal, TickCtr};
use qp_qep::{Hsm, Outcome};
use qp_qf::{ActiveContext, Event, Framework, TimeEventId};
use qp_qs::Tracer;

pub const N_PHILO: usize = 5;

/// Published by the table, payload: philosopher number
pub const EAT: Signal = Signal(Signal::USER.0);
/// Philosopher to table, payload: philosopher number
pub const DONE: Signal = Signal(Signal::USER.0 + 1);
pub const HUNGRY: Signal = Signal(Signal::USER.0 + 2);
/// Pauses or resumes serving
pub const TOGGLE: Signal = Signal(Signal::USER.0 + 3);
pub const TIMEOUT: Signal = Signal(Signal::USER.0 + 4);
pub const MAX_SIG: u16 = Signal::USER.0 + 5;

pub const TABLE: Priority = priority!(6);

pub const THINK_TICKS: TickCtr = 7;
pub const EAT_TICKS: TickCtr = 5;

pub fn philo_priority(n: usize) -> Priority {
    Priority::new_unchecked(n as u8 + 1)
}

fn right_fork(n: usize) -> usize {
    (n + 1) % N_PHILO
}

fn left_neighbour(n: usize) -> usize {
    (n + N_PHILO - 1) % N_PHILO
}

fn right_neighbour(n: usize) -> usize {
    (n + 1) % N_PHILO
}

/// Counters shared with whoever reports on the dinner.
#[derive(Debug, Default)]
pub struct Stats {
    pub meals: [u32; N_PHILO],
    pub eating: [bool; N_PHILO],
}

pub type SharedStats = Arc<Mutex<Stats>>;

pub struct Philosopher {
    n: u8,
    timer: Option<TimeEventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiloState {
    Thinking,
    Hungry,
    Eating,
}

impl Philosopher {
    pub fn new(n: usize) -> Self {
        Self {
            n: n as u8,
            timer: None,
        }
    }

    fn arm(&self, ctx: &ActiveContext, ticks: TickCtr) {
        if let Some(timer) = self.timer {
            ctx.framework().arm(timer, ticks, 0);
        }
    }
}

impl Hsm for Philosopher {
    type State = PhiloState;
    type Event = Event;
    type Context = ActiveContext;

    fn parent(_state: PhiloState) -> Option<PhiloState> {
        None
    }

    fn top_initial(&mut self, ctx: &mut ActiveContext) -> PhiloState {
        self.timer = Some(ctx.framework().time_event(ctx.me(), TIMEOUT, 0));
        ctx.subscribe(EAT);
        PhiloState::Thinking
    }

    fn entry(&mut self, ctx: &mut ActiveContext, state: PhiloState) {
        match state {
            // stagger the first meals a little
            PhiloState::Thinking => self.arm(ctx, THINK_TICKS + self.n as TickCtr),
            PhiloState::Hungry => ctx.post(TABLE, ctx.new_event(HUNGRY, &[self.n])),
            PhiloState::Eating => self.arm(ctx, EAT_TICKS),
        }
    }

    fn exit(&mut self, ctx: &mut ActiveContext, state: PhiloState) {
        if state == PhiloState::Eating {
            ctx.post(TABLE, ctx.new_event(DONE, &[self.n]));
        }
    }

    fn handle(
        &mut self,
        _ctx: &mut ActiveContext,
        state: PhiloState,
        e: &Event,
    ) -> Outcome<PhiloState> {
        match (state, e.signal()) {
            (PhiloState::Thinking, TIMEOUT) => Outcome::Transition(PhiloState::Hungry),
            (PhiloState::Hungry, EAT) if e.param() == Some(self.n) => {
                Outcome::Transition(PhiloState::Eating)
            }
            (PhiloState::Eating, TIMEOUT) => Outcome::Transition(PhiloState::Thinking),
            // somebody else's meal
            (_, EAT) => Outcome::Handled,
            _ => Outcome::Ignored,
        }
    }
}

pub struct Table {
    forks_free: [bool; N_PHILO],
    hungry: [bool; N_PHILO],
    stats: SharedStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Active,
    Serving,
    Paused,
}

impl Table {
    pub fn new(stats: SharedStats) -> Self {
        Self {
            forks_free: [true; N_PHILO],
            hungry: [false; N_PHILO],
            stats,
        }
    }

    fn can_eat(&self, n: usize) -> bool {
        self.hungry[n] && self.forks_free[n] && self.forks_free[right_fork(n)]
    }

    fn serve(&mut self, ctx: &ActiveContext, n: usize) {
        self.forks_free[n] = false;
        self.forks_free[right_fork(n)] = false;
        self.hungry[n] = false;
        {
            let mut stats = self.stats.lock();
            stats.meals[n] += 1;
            stats.eating[n] = true;
        }
        log::debug!("philosopher {n} eats");
        ctx.publish(ctx.new_event(EAT, &[n as u8]));
    }

    fn put_down(&mut self, n: usize) {
        self.forks_free[n] = true;
        self.forks_free[right_fork(n)] = true;
        self.stats.lock().eating[n] = false;
    }
}

impl Hsm for Table {
    type State = TableState;
    type Event = Event;
    type Context = ActiveContext;

    fn parent(state: TableState) -> Option<TableState> {
        match state {
            TableState::Active => None,
            TableState::Serving | TableState::Paused => Some(TableState::Active),
        }
    }

    fn top_initial(&mut self, _ctx: &mut ActiveContext) -> TableState {
        TableState::Serving
    }

    fn entry(&mut self, ctx: &mut ActiveContext, state: TableState) {
        match state {
            TableState::Serving => {
                for n in 0..N_PHILO {
                    if self.can_eat(n) {
                        self.serve(ctx, n);
                    }
                }
            }
            TableState::Paused => log::info!("table paused"),
            TableState::Active => {}
        }
    }

    fn handle(
        &mut self,
        ctx: &mut ActiveContext,
        state: TableState,
        e: &Event,
    ) -> Outcome<TableState> {
        let Some(n) = e.param().map(usize::from).filter(|&n| n < N_PHILO) else {
            return match (state, e.signal()) {
                (TableState::Serving, TOGGLE) => Outcome::Transition(TableState::Paused),
                (TableState::Paused, TOGGLE) => Outcome::Transition(TableState::Serving),
                _ => Outcome::Ignored,
            };
        };

        match (state, e.signal()) {
            (TableState::Active, HUNGRY) => {
                self.hungry[n] = true;
                Outcome::Handled
            }
            (TableState::Serving, HUNGRY) => {
                self.hungry[n] = true;
                if self.can_eat(n) {
                    self.serve(ctx, n);
                }
                Outcome::Handled
            }
            (TableState::Active, DONE) => {
                self.put_down(n);
                Outcome::Handled
            }
            (TableState::Serving, DONE) => {
                self.put_down(n);
                for m in [right_neighbour(n), left_neighbour(n)] {
                    if self.can_eat(m) {
                        self.serve(ctx, m);
                    }
                }
                Outcome::Handled
            }
            _ => Outcome::Ignored,
        }
    }
}

/// Starts the table and the philosophers on `fw`.
pub fn start(fw: &Arc<Framework>, stats: &SharedStats) {
    if let Some(tracer) = fw.tracer() {
        dictionaries(tracer);
    }
    fw.start_active(TABLE, N_PHILO * 2, Table::new(Arc::clone(stats)));
    for n in 0..N_PHILO {
        fw.start_active(philo_priority(n), N_PHILO, Philosopher::new(n));
    }
}

fn dictionaries(tracer: &Tracer) {
    for (sig, name) in [
        (EAT, "EAT"),
        (DONE, "DONE"),
        (HUNGRY, "HUNGRY"),
        (TOGGLE, "TOGGLE"),
        (TIMEOUT, "TIMEOUT"),
    ] {
        tracer.sig_dict(sig, 0, name);
    }
}
