//! Time events
//!
//! Every tick rate owns a singly linked list of armed time events. Arming
//! pushes onto a separate list of freshly armed events; only
//! [`Framework::tick`] touches the main list, appending the fresh list when
//! its walk reaches the end. A time event whose counter is zero while still
//! linked is scheduled for removal and gets unlinked by the next walk.

use alloc::vec::Vec;
use core::fmt;

use qp_core::{q_require, Priority, Signal, TickCtr};
use qp_mem::EventRef;
use qp_qs::Record;

use crate::Framework;

/// Handle of a time event created with [`Framework::time_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeEventId(u16);

impl TimeEventId {
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TimeEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeEvt({})", self.0)
    }
}

struct TimeEvt {
    target: Priority,
    signal: Signal,
    rate: u8,
    ctr: TickCtr,
    interval: TickCtr,
    next: Option<u16>,
    linked: bool,
    was_disarmed: bool,
}

pub(crate) struct TimerTable {
    slots: Vec<TimeEvt>,
    heads: Vec<Option<u16>>,
    fresh: Vec<Option<u16>>,
    ticks: Vec<u32>,
}

impl TimerTable {
    pub(crate) fn new(rates: u8) -> Self {
        let rates = rates as usize;
        Self {
            slots: Vec::new(),
            heads: alloc::vec![None; rates],
            fresh: alloc::vec![None; rates],
            ticks: alloc::vec![0; rates],
        }
    }

    fn get(&mut self, id: TimeEventId) -> &mut TimeEvt {
        q_require!(100, (id.0 as usize) < self.slots.len());
        &mut self.slots[id.0 as usize]
    }

    /// Links `id` onto the fresh list unless it is linked already.
    fn link(&mut self, id: TimeEventId) {
        let rate = self.slots[id.0 as usize].rate as usize;
        let fresh = self.fresh[rate];
        let te = &mut self.slots[id.0 as usize];
        if !te.linked {
            te.linked = true;
            te.next = fresh;
            self.fresh[rate] = Some(id.0);
        }
    }

    fn set_next(&mut self, rate: usize, prev: Option<u16>, next: Option<u16>) {
        match prev {
            None => self.heads[rate] = next,
            Some(p) => self.slots[p as usize].next = next,
        }
    }

    fn unlink(&mut self, rate: usize, prev: Option<u16>, t: u16) {
        let te = &mut self.slots[t as usize];
        let after = te.next.take();
        te.linked = false;
        self.set_next(rate, prev, after);
    }
}

/// One expiry collected during a tick walk.
struct Fired {
    id: u16,
    target: Priority,
    signal: Signal,
}

impl Framework {
    /// Creates a disarmed time event that will post `signal` to `target`
    /// at tick rate `rate`.
    ///
    /// A signal below [`Signal::USER`] does not post anything; expiry wakes
    /// the extended thread at `target` with a timeout instead.
    pub fn time_event(&self, target: Priority, signal: Signal, rate: u8) -> TimeEventId {
        q_require!(200, rate < self.config().tick_rates);
        q_require!(201, target.is_valid());
        self.with(|sh| {
            let table = &mut sh.timers;
            q_require!(202, table.slots.len() < u16::MAX as usize);
            table.slots.push(TimeEvt {
                target,
                signal,
                rate,
                ctr: 0,
                interval: 0,
                next: None,
                linked: false,
                was_disarmed: false,
            });
            TimeEventId(table.slots.len() as u16 - 1)
        })
    }

    /// Arms `id` to expire after `n_ticks`, then every `interval` ticks
    /// (`0` for one-shot).
    ///
    /// Arming a time event that is still running only reloads its counters.
    pub fn arm(&self, id: TimeEventId, n_ticks: TickCtr, interval: TickCtr) {
        q_require!(300, n_ticks != 0);
        self.with(|sh| {
            let te = sh.timers.get(id);
            te.ctr = n_ticks;
            te.interval = interval;
            let (target, rate) = (te.target, te.rate);
            sh.timers.link(id);
            if let Some(rec) = self.trace(Record::TimeEvtArm, target.raw()) {
                rec.u16(id.0)
                    .u8(target.raw())
                    .u32(n_ticks)
                    .u32(interval)
                    .u8(rate)
                    .end();
            }
        });
    }

    /// Stops `id`. Returns `true` when it was running; `false` means a
    /// one-shot already expired (its event is on the way) or it was never
    /// armed. Disarming twice is harmless.
    pub fn disarm(&self, id: TimeEventId) -> bool {
        self.with(|sh| {
            let te = sh.timers.get(id);
            let was_armed = te.ctr != 0;
            let (target, rate, ctr, interval) = (te.target, te.rate, te.ctr, te.interval);
            te.was_disarmed = was_armed;
            te.ctr = 0;
            if was_armed {
                if let Some(rec) = self.trace(Record::TimeEvtDisarm, target.raw()) {
                    rec.u16(id.0)
                        .u8(target.raw())
                        .u32(ctr)
                        .u32(interval)
                        .u8(rate)
                        .end();
                }
            } else if let Some(rec) = self.trace(Record::TimeEvtDisarmAttempt, target.raw()) {
                rec.u16(id.0).u8(target.raw()).u8(rate).end();
            }
            was_armed
        })
    }

    /// Reloads the counter of `id` with `n_ticks`, keeping its interval.
    /// Returns whether it was running; a stopped time event is armed.
    pub fn rearm(&self, id: TimeEventId, n_ticks: TickCtr) -> bool {
        q_require!(400, n_ticks != 0);
        self.with(|sh| {
            let te = sh.timers.get(id);
            let was_armed = te.ctr != 0;
            te.ctr = n_ticks;
            let (target, rate, interval) = (te.target, te.rate, te.interval);
            if !was_armed {
                sh.timers.link(id);
            }
            if let Some(rec) = self.trace(Record::TimeEvtRearm, target.raw()) {
                rec.u16(id.0)
                    .u8(target.raw())
                    .u32(n_ticks)
                    .u32(interval)
                    .u8(rate)
                    .u8(was_armed as u8)
                    .end();
            }
            was_armed
        })
    }

    /// Whether the last [`disarm`](Self::disarm) actually stopped a running
    /// time event. Sets the flag as a side effect, so asking again answers
    /// `true`.
    pub fn was_disarmed(&self, id: TimeEventId) -> bool {
        self.with(|sh| {
            let te = sh.timers.get(id);
            let was = te.was_disarmed;
            te.was_disarmed = true;
            was
        })
    }

    /// Ticks left until `id` expires, `0` when it is not running
    pub fn current_ctr(&self, id: TimeEventId) -> TickCtr {
        self.with(|sh| sh.timers.get(id).ctr)
    }

    /// `true` when nothing is linked at `rate`.
    pub fn no_time_events_active(&self, rate: u8) -> bool {
        q_require!(500, rate < self.config().tick_rates);
        self.with(|sh| {
            let r = rate as usize;
            sh.timers.heads[r].is_none() && sh.timers.fresh[r].is_none()
        })
    }

    /// Processes one clock tick at `rate`.
    ///
    /// Meant for a periodic interrupt or a [`Ticker`](crate::Ticker). Not
    /// reentrant for the same rate.
    pub fn tick(&self, rate: u8) {
        q_require!(600, rate < self.config().tick_rates);
        let r = rate as usize;

        let fired = self.with(|sh| {
            let table = &mut sh.timers;
            table.ticks[r] = table.ticks[r].wrapping_add(1);
            if let Some(rec) = self.trace(Record::Tick, 0) {
                rec.u32(table.ticks[r]).u8(rate).end();
            }

            let mut fired = Vec::new();
            let mut prev: Option<u16> = None;
            loop {
                let next = match prev {
                    None => table.heads[r],
                    Some(p) => table.slots[p as usize].next,
                };
                let t = match next {
                    Some(t) => t,
                    None => match table.fresh[r].take() {
                        Some(f) => {
                            table.set_next(r, prev, Some(f));
                            f
                        }
                        None => break,
                    },
                };

                let te = &mut table.slots[t as usize];
                if te.ctr == 0 {
                    // disarmed since the last tick
                    table.unlink(r, prev, t);
                    continue;
                }

                te.ctr -= 1;
                if te.ctr != 0 {
                    prev = Some(t);
                    continue;
                }

                let (target, signal) = (te.target, te.signal);
                if te.interval != 0 {
                    te.ctr = te.interval;
                    prev = Some(t);
                } else {
                    table.unlink(r, prev, t);
                    if let Some(rec) = self.trace(Record::TimeEvtAutoDisarm, target.raw()) {
                        rec.u16(t).u8(target.raw()).u8(rate).end();
                    }
                }
                if let Some(rec) = self.trace(Record::TimeEvtPost, target.raw()) {
                    rec.u16(t).signal(signal).u8(target.raw()).u8(rate).end();
                }
                fired.push(Fired {
                    id: t,
                    target,
                    signal,
                });
            }
            fired
        });

        for f in fired {
            if f.signal < Signal::USER {
                self.flag_timeout(f.target);
            } else {
                log::trace!("time event {} posts {} to {}", f.id, f.signal, f.target);
                self.post(f.target, EventRef::from_signal(f.signal));
            }
        }
    }
}
