use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Mutex, ReentrantMutex};
use qp_core::{q_error, q_require, Priority, Signal};
use qp_qf::{Framework, SchedStatus, TimeEventId};
use qp_qs::Record;

use crate::thread::{Task, ThreadContext, ThreadWaker};

#[derive(Debug, Default)]
struct Cpu {
    active: u8,
    isr_nest: u8,
}

struct ThreadSlot {
    /// `None` while the thread is being polled
    task: Option<Task>,
    timer: TimeEventId,
    waker: Waker,
}

/// Scheduler for active objects and extended threads sharing one
/// [`Framework`].
pub struct QxkKernel {
    fw: Arc<Framework>,
    cpu: ReentrantMutex<RefCell<Cpu>>,
    threads: Mutex<Vec<Option<ThreadSlot>>>,
    /// Time event of each thread priority, kept across thread restarts
    timers: Mutex<Vec<Option<TimeEventId>>>,
}

impl QxkKernel {
    pub fn new(fw: Arc<Framework>) -> Self {
        let slots = fw.config().max_active as usize + 1;
        Self {
            fw,
            cpu: ReentrantMutex::new(RefCell::new(Cpu::default())),
            threads: Mutex::new((0..slots).map(|_| None).collect()),
            timers: Mutex::new(vec![None; slots]),
        }
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.fw
    }

    /// Starts an extended thread at `prio` with a private queue of
    /// `queue_len` events.
    ///
    /// `body` gets the thread's context and returns the future the kernel
    /// polls. The thread is ready at once; when its future completes the
    /// priority is released.
    pub fn start_thread<F, Fut>(&self, prio: Priority, queue_len: usize, body: F)
    where
        F: FnOnce(ThreadContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let idx = prio.raw() as usize;
        q_require!(
            100,
            matches!(self.threads.lock().get(idx), Some(None))
        );

        let timer = *self.timers.lock()[idx]
            .get_or_insert_with(|| self.fw.time_event(prio, Signal::EMPTY, 0));
        let ctx = ThreadContext::new(Arc::clone(&self.fw), prio, timer);
        let waker = Waker::from(Arc::new(ThreadWaker {
            fw: Arc::clone(&self.fw),
            prio,
        }));
        let task: Task = Box::pin(body(ctx));
        self.threads.lock()[idx] = Some(ThreadSlot {
            task: Some(task),
            timer,
            waker,
        });

        // the slot exists before the ready bit does
        self.fw.register_thread(prio, queue_len);
        if let Some(tracer) = self.fw.tracer() {
            tracer.obj_dict(prio.raw() as u64, "thread");
        }
        log::debug!("thread started at {prio}");
    }

    pub fn is_thread(&self, prio: Priority) -> bool {
        matches!(self.threads.lock().get(prio.raw() as usize), Some(Some(_)))
    }

    /// Ends a [`ThreadContext::delay`] early. Returns `false` when the
    /// thread at `prio` was not delayed.
    pub fn delay_cancel(&self, prio: Priority) -> bool {
        let timer = match self.threads.lock().get(prio.raw() as usize) {
            Some(Some(slot)) => slot.timer,
            _ => return false,
        };
        let cancelled = self.fw.disarm(timer);
        if cancelled {
            self.fw.make_ready(prio);
        }
        cancelled
    }

    pub fn active_priority(&self) -> u8 {
        self.cpu.lock().borrow().active
    }

    /// Activation floor: the running level, raised to a mutex ceiling when
    /// the running thread locked one since it was resumed.
    fn floor(&self, active: u8) -> u8 {
        Priority::new(active)
            .map(|p| self.fw.effective_priority(p).raw())
            .unwrap_or(active)
    }

    pub fn is_in_isr(&self) -> bool {
        self.cpu.lock().borrow().isr_nest != 0
    }

    /// Runs the event loop until [`Framework::stop`] is called.
    pub fn run(&self) {
        let hooks = self.fw.hooks();
        if let Some(rec) = self.fw.trace(Record::QfRun, 0) {
            rec.end();
        }
        log::info!("QXK kernel running");
        hooks.on_startup();

        while !self.fw.is_stopped() {
            if self.activate(0) == 0 {
                hooks.on_idle();
            }
        }

        hooks.on_cleanup();
        log::info!("QXK kernel stopped");
    }

    /// Runs ready entities until nothing is ready. Returns how many
    /// dispatches and thread resumptions happened.
    pub fn run_until_idle(&self) -> usize {
        self.activate(0)
    }

    pub fn has_pending_work(&self) -> bool {
        self.fw.next_ready(self.floor(self.active_priority())).is_some()
    }

    /// Runs `f` as an interrupt service routine; see
    /// `qp_qk::QkKernel::isr`.
    pub fn isr<R>(&self, f: impl FnOnce(&Arc<Framework>) -> R) -> R {
        let cpu = self.cpu.lock();
        let (nest, active) = {
            let mut c = cpu.borrow_mut();
            c.isr_nest += 1;
            (c.isr_nest, c.active)
        };
        if let Some(rec) = self.fw.trace(Record::IsrEntry, 0) {
            rec.u8(nest).u8(active).end();
        }

        let result = f(&self.fw);

        let (nest, active) = {
            let mut c = cpu.borrow_mut();
            c.isr_nest -= 1;
            (c.isr_nest, c.active)
        };
        if let Some(rec) = self.fw.trace(Record::IsrExit, 0) {
            rec.u8(nest).u8(active).end();
        }
        if nest == 0 {
            self.activate(self.floor(active));
        }
        result
    }

    pub fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.fw.sched_lock(ceiling)
    }

    pub fn sched_unlock(&self, status: SchedStatus) {
        self.fw.sched_unlock(status);
        if matches!(status, SchedStatus::Locked(_)) && !self.is_in_isr() {
            self.activate(self.floor(self.active_priority()));
        }
    }

    fn activate(&self, floor: u8) -> usize {
        let cpu = self.cpu.lock();
        let preempted = cpu.borrow().active;
        let mut last = preempted;
        let mut n = 0;

        while let Some(next) = self.fw.next_ready(floor) {
            if next.raw() != last {
                let record = if preempted == 0 {
                    Record::SchedNext
                } else {
                    Record::SchedPreempt
                };
                if let Some(rec) = self.fw.trace(record, next.raw()) {
                    rec.u8(next.raw()).u8(last).end();
                }
            }
            cpu.borrow_mut().active = next.raw();
            last = next.raw();

            // a mutex ceiling runs the thread holding it
            let thread = self.fw.ceiling_holder(next).unwrap_or(next);
            if !self.resume(thread) && !self.fw.dispatch(next) {
                // nothing registered there any more
                self.fw.clear_ready(next);
            }
            n += 1;
        }

        cpu.borrow_mut().active = preempted;
        if n != 0 {
            if preempted == 0 {
                if let Some(rec) = self.fw.trace(Record::SchedIdle, last) {
                    rec.u8(last).end();
                }
            } else if let Some(rec) = self.fw.trace(Record::SchedRestore, preempted) {
                rec.u8(preempted).u8(last).end();
            }
        }
        n
    }

    /// Polls the thread at `prio` once. Returns `false` when `prio` is not
    /// a thread.
    fn resume(&self, prio: Priority) -> bool {
        let idx = prio.raw() as usize;
        let (mut task, waker) = {
            let mut threads = self.threads.lock();
            let Some(slot) = threads.get_mut(idx).and_then(Option::as_mut) else {
                return false;
            };
            // a thread being polled sits at or below every activation floor
            let Some(task) = slot.task.take() else {
                q_error!(200)
            };
            (task, slot.waker.clone())
        };

        self.fw.clear_ready(prio);
        let mut cx = Context::from_waker(&waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Pending => {
                if let Some(Some(slot)) = self.threads.lock().get_mut(idx) {
                    slot.task = Some(task);
                }
            }
            Poll::Ready(()) => {
                let slot = self.threads.lock()[idx].take();
                if let Some(slot) = slot {
                    self.fw.disarm(slot.timer);
                }
                self.fw.unregister(prio);
                log::debug!("thread at {prio} finished");
            }
        }
        true
    }
}
