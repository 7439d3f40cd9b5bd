#![forbid(unsafe_code)]

//! # QV cooperative kernel
//!
//! Run-to-completion dispatching of active objects in priority order, with
//! no preemption at all: the next event is picked only after the current one
//! has been processed completely. When nothing is ready the kernel calls the
//! `on_idle` hook.

use std::cell::Cell;
use std::sync::Arc;

use qp_core::Priority;
use qp_qf::Framework;
use qp_qs::Record;

/// Cooperative scheduler over a shared [`Framework`].
///
/// The kernel itself is single-threaded; other threads (a tick source, a
/// simulated interrupt) talk to it only through the framework.
pub struct QvKernel {
    fw: Arc<Framework>,
    /// Priority of the last dispatch, `0` after going idle
    last: Cell<u8>,
}

impl QvKernel {
    pub fn new(fw: Arc<Framework>) -> Self {
        Self {
            fw,
            last: Cell::new(0),
        }
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.fw
    }

    /// Runs the event loop until [`Framework::stop`] is called.
    ///
    /// Calls `on_startup` before the first dispatch and `on_cleanup` after
    /// the loop ends.
    pub fn run(&self) {
        let hooks = self.fw.hooks();
        if let Some(rec) = self.fw.trace(Record::QfRun, 0) {
            rec.end();
        }
        log::info!("QV kernel running");
        hooks.on_startup();

        while !self.fw.is_stopped() {
            if !self.dispatch_once() {
                self.go_idle();
                hooks.on_idle();
            }
        }

        hooks.on_cleanup();
        log::info!("QV kernel stopped");
    }

    /// Processes one event of the highest-priority ready active object.
    /// Returns `false` when nothing was ready.
    pub fn dispatch_once(&self) -> bool {
        let Some(prio) = self.fw.next_ready(0) else {
            return false;
        };
        self.trace_next(prio);
        self.fw.dispatch(prio);
        true
    }

    /// Dispatches until no active object is ready. Returns the number of
    /// events processed.
    pub fn run_until_idle(&self) -> usize {
        let mut n = 0;
        while self.dispatch_once() {
            n += 1;
        }
        self.go_idle();
        n
    }

    pub fn has_pending_work(&self) -> bool {
        self.fw.next_ready(0).is_some()
    }

    fn trace_next(&self, prio: Priority) {
        let prev = self.last.replace(prio.raw());
        if prev != prio.raw() {
            if let Some(rec) = self.fw.trace(Record::SchedNext, prio.raw()) {
                rec.u8(prio.raw()).u8(prev).end();
            }
        }
    }

    fn go_idle(&self) {
        let prev = self.last.replace(0);
        if prev != 0 {
            if let Some(rec) = self.fw.trace(Record::SchedIdle, prev) {
                rec.u8(prev).end();
            }
        }
    }
}
