//! Extended threads
//!
//! A thread body is an `async` block that receives its [`ThreadContext`].
//! Each thread owns a private event queue and a private time event. The
//! time event carries the reserved signal `EMPTY`, so on expiry it flags a
//! timeout and makes the thread ready instead of posting.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Poll, Wake};

use qp_core::{q_require, Priority, Signal, TickCtr};
use qp_qf::{Event, EventRef, Framework, TimeEventId};

pub(crate) type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Waking a thread sets its bit in the ready-set.
pub(crate) struct ThreadWaker {
    pub(crate) fw: Arc<Framework>,
    pub(crate) prio: Priority,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // a finished thread may still be referenced by a primitive
        if self.fw.is_registered(self.prio) {
            self.fw.make_ready(self.prio);
        }
    }
}

/// Handle a thread body uses to block, post and receive events.
pub struct ThreadContext {
    fw: Arc<Framework>,
    prio: Priority,
    timer: TimeEventId,
}

impl ThreadContext {
    pub(crate) fn new(fw: Arc<Framework>, prio: Priority, timer: TimeEventId) -> Self {
        Self { fw, prio, timer }
    }

    pub fn me(&self) -> Priority {
        self.prio
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.fw
    }

    pub fn post(&self, target: Priority, e: EventRef) {
        self.fw.post(target, e);
    }

    pub fn publish(&self, e: EventRef) {
        self.fw.publish(e);
    }

    pub fn new_event(&self, signal: Signal, payload: &[u8]) -> EventRef {
        self.fw.new_event(signal, payload)
    }

    /// Blocks for `ticks` clock ticks.
    ///
    /// Returns `true` when the delay ran out and `false` when it was cut
    /// short by [`QxkKernel::delay_cancel`](crate::QxkKernel::delay_cancel).
    pub async fn delay(&self, ticks: TickCtr) -> bool {
        q_require!(100, ticks != 0);
        self.begin_wait(ticks);
        poll_fn(|_cx| {
            if self.take_timeout() {
                Poll::Ready(true)
            } else if self.fw.current_ctr(self.timer) == 0 {
                Poll::Ready(false)
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Takes the next event from the thread's own queue, blocking up to
    /// `ticks` ticks (`0` waits forever). `None` means the wait timed out.
    ///
    /// The returned event is a copy; the queued original is recycled.
    pub async fn queue_get(&self, ticks: TickCtr) -> Option<Event> {
        if let Some(e) = self.take_event() {
            return Some(e);
        }
        self.begin_wait(ticks);
        poll_fn(|_cx| {
            if let Some(e) = self.take_event() {
                self.end_wait();
                Poll::Ready(Some(e))
            } else if self.take_timeout() {
                Poll::Ready(None)
            } else {
                Poll::Pending
            }
        })
        .await
    }

    fn take_event(&self) -> Option<Event> {
        let (e, event) = self.fw.thread_get(self.prio)?;
        self.fw.gc(e);
        Some(event)
    }

    /// Clears a stale timeout and arms the thread's timer. `0` arms
    /// nothing.
    pub(crate) fn begin_wait(&self, ticks: TickCtr) {
        self.fw.take_timeout(self.prio);
        if ticks != 0 {
            self.fw.arm(self.timer, ticks, 0);
        }
    }

    /// Stops the timer of a wait that ended for another reason.
    pub(crate) fn end_wait(&self) {
        if self.fw.current_ctr(self.timer) != 0 {
            self.fw.disarm(self.timer);
        }
        self.fw.take_timeout(self.prio);
    }

    pub(crate) fn take_timeout(&self) -> bool {
        self.fw.take_timeout(self.prio)
    }
}
