use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use qp_core::Priority;
use qp_qf::{Framework, SchedStatus};
use qp_qs::Record;

#[derive(Debug, Default)]
struct Cpu {
    /// Priority of the dispatch in progress, `0` at idle
    active: u8,
    isr_nest: u8,
}

pub struct QkKernel {
    fw: Arc<Framework>,
    cpu: ReentrantMutex<RefCell<Cpu>>,
}

impl QkKernel {
    pub fn new(fw: Arc<Framework>) -> Self {
        Self {
            fw,
            cpu: ReentrantMutex::new(RefCell::new(Cpu::default())),
        }
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.fw
    }

    /// Priority currently running, `0` when the kernel is idle.
    pub fn active_priority(&self) -> u8 {
        self.cpu.lock().borrow().active
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
        log::info!("QK kernel running");
        hooks.on_startup();

        while !self.fw.is_stopped() {
            // the CPU lock is released while idling so interrupts get in
            if self.activate(0) == 0 {
                hooks.on_idle();
            }
        }

        hooks.on_cleanup();
        log::info!("QK kernel stopped");
    }

    /// Activates ready active objects until none is left above the idle
    /// level. Returns the number of events processed.
    pub fn run_until_idle(&self) -> usize {
        self.activate(0)
    }

    pub fn has_pending_work(&self) -> bool {
        self.fw.next_ready(self.active_priority()).is_some()
    }

    /// Runs `f` as an interrupt service routine.
    ///
    /// Interrupts nest; when the outermost one returns, every ready active
    /// object above the interrupted priority runs before control goes back.
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
            self.activate(active);
        }
        result
    }

    pub fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.fw.sched_lock(ceiling)
    }

    /// Restores the lock and runs whatever the lock held back.
    pub fn sched_unlock(&self, status: SchedStatus) {
        self.fw.sched_unlock(status);
        if matches!(status, SchedStatus::Locked(_)) && !self.is_in_isr() {
            self.activate(self.active_priority());
        }
    }

    /// Dispatches every ready active object above `floor`, highest first,
    /// then restores the preempted priority.
    fn activate(&self, floor: u8) -> usize {
        let cpu = self.cpu.lock();
        let preempted = cpu.borrow().active;
        let mut last = preempted;
        let mut n = 0;

        while let Some(next) = self.fw.next_ready(floor) {
            self.trace_switch(next, last, preempted);
            cpu.borrow_mut().active = next.raw();
            last = next.raw();
            // no RefCell borrow is held while the handler runs
            self.fw.dispatch(next);
            n += 1;
        }

        cpu.borrow_mut().active = preempted;
        if n != 0 {
            self.trace_restore(last, preempted);
        }
        n
    }

    fn trace_switch(&self, next: Priority, last: u8, preempted: u8) {
        if next.raw() == last {
            return;
        }
        let record = if preempted == 0 {
            Record::SchedNext
        } else {
            Record::SchedPreempt
        };
        if let Some(rec) = self.fw.trace(record, next.raw()) {
            rec.u8(next.raw()).u8(last).end();
        }
    }

    fn trace_restore(&self, last: u8, preempted: u8) {
        if preempted == 0 {
            if let Some(rec) = self.fw.trace(Record::SchedIdle, last) {
                rec.u8(last).end();
            }
        } else if let Some(rec) = self.fw.trace(Record::SchedRestore, preempted) {
            rec.u8(preempted).u8(last).end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::thread;

    use parking_lot::Mutex;
    use qp_core::{priority, Hooks, Signal};
    use qp_mem::EventRef;
    use qp_qep::{Hsm, Outcome};
    use qp_qf::{ActiveContext, Event, FrameworkConfig};

    const GO: Signal = Signal(Signal::USER.0);
    const ECHO: Signal = Signal(Signal::USER.0 + 1);
    const NEWS: Signal = Signal(Signal::USER.0 + 2);
    const DONE: Signal = Signal(Signal::USER.0 + 3);

    type Log = Arc<Mutex<Vec<(u8, Signal)>>>;
    type KernelSlot = Arc<OnceLock<Weak<QkKernel>>>;

    /// Logs every event. On `GO` it posts `ECHO` to `echo_to`, from an
    /// interrupt when a kernel is installed, then logs `DONE`.
    struct Recorder {
        log: Log,
        echo_to: Option<Priority>,
        kernel: Option<KernelSlot>,
        subscribe: Option<Signal>,
    }

    impl Recorder {
        fn new(log: &Log) -> Self {
            Self {
                log: Arc::clone(log),
                echo_to: None,
                kernel: None,
                subscribe: None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Rec {
        Active,
    }

    impl Hsm for Recorder {
        type State = Rec;
        type Event = Event;
        type Context = ActiveContext;

        fn parent(_: Rec) -> Option<Rec> {
            None
        }

        fn top_initial(&mut self, ctx: &mut ActiveContext) -> Rec {
            if let Some(sig) = self.subscribe {
                ctx.subscribe(sig);
            }
            Rec::Active
        }

        fn handle(&mut self, ctx: &mut ActiveContext, _: Rec, e: &Event) -> Outcome<Rec> {
            let me = ctx.me().raw();
            self.log.lock().push((me, e.signal()));
            let (GO, Some(to)) = (e.signal(), self.echo_to) else {
                return Outcome::Handled;
            };
            let kernel = self.kernel.as_ref().and_then(|k| k.get()?.upgrade());
            match kernel {
                Some(k) => k.isr(|fw| fw.post(to, EventRef::from_signal(ECHO))),
                None => ctx.post(to, EventRef::from_signal(ECHO)),
            }
            self.log.lock().push((me, DONE));
            Outcome::Handled
        }
    }

    fn framework() -> Arc<Framework> {
        Framework::new(FrameworkConfig::builder().max_signal(16).pool(8, 4).build())
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn schedules_highest_priority_first() {
        let fw = framework();
        let log = log();
        fw.start_active(priority!(2), 4, Recorder::new(&log));
        fw.start_active(priority!(5), 4, Recorder::new(&log));
        let kernel = QkKernel::new(Arc::clone(&fw));

        fw.post(priority!(2), EventRef::from_signal(NEWS));
        fw.post(priority!(5), EventRef::from_signal(ECHO));

        assert_eq!(kernel.run_until_idle(), 2);
        assert_eq!(*log.lock(), [(5, ECHO), (2, NEWS)]);
        assert_eq!(kernel.active_priority(), 0);
    }

    #[test]
    fn task_level_post_waits_for_the_dispatch_to_finish() {
        let fw = framework();
        let log = log();
        let mut low = Recorder::new(&log);
        low.echo_to = Some(priority!(7));
        fw.start_active(priority!(1), 4, low);
        fw.start_active(priority!(7), 4, Recorder::new(&log));
        let kernel = QkKernel::new(Arc::clone(&fw));

        fw.post(priority!(1), EventRef::from_signal(GO));
        kernel.run_until_idle();

        assert_eq!(*log.lock(), [(1, GO), (1, DONE), (7, ECHO)]);
    }

    #[test]
    fn interrupt_preempts_lower_priority_dispatch() {
        let fw = framework();
        let log = log();
        let slot: KernelSlot = Arc::new(OnceLock::new());
        let mut low = Recorder::new(&log);
        low.echo_to = Some(priority!(7));
        low.kernel = Some(Arc::clone(&slot));
        fw.start_active(priority!(1), 4, low);
        fw.start_active(priority!(7), 4, Recorder::new(&log));
        let kernel = Arc::new(QkKernel::new(Arc::clone(&fw)));
        slot.set(Arc::downgrade(&kernel)).unwrap();

        fw.post(priority!(1), EventRef::from_signal(GO));
        kernel.run_until_idle();

        assert_eq!(*log.lock(), [(1, GO), (7, ECHO), (1, DONE)]);
        assert_eq!(kernel.active_priority(), 0);
    }

    #[test]
    fn interrupt_does_not_preempt_higher_priority() {
        let fw = framework();
        let log = log();
        let slot: KernelSlot = Arc::new(OnceLock::new());
        let mut high = Recorder::new(&log);
        high.echo_to = Some(priority!(2));
        high.kernel = Some(Arc::clone(&slot));
        fw.start_active(priority!(6), 4, high);
        fw.start_active(priority!(2), 4, Recorder::new(&log));
        let kernel = Arc::new(QkKernel::new(Arc::clone(&fw)));
        slot.set(Arc::downgrade(&kernel)).unwrap();

        fw.post(priority!(6), EventRef::from_signal(GO));
        kernel.run_until_idle();

        assert_eq!(*log.lock(), [(6, GO), (6, DONE), (2, ECHO)]);
    }

    #[test]
    fn nested_interrupts_activate_on_the_outermost_exit() {
        let fw = framework();
        let log = log();
        fw.start_active(priority!(3), 4, Recorder::new(&log));
        let kernel = QkKernel::new(Arc::clone(&fw));

        kernel.isr(|_| {
            kernel.isr(|fw| fw.post(priority!(3), EventRef::from_signal(NEWS)));
            assert!(kernel.is_in_isr());
            assert!(log.lock().is_empty());
        });

        assert!(!kernel.is_in_isr());
        assert_eq!(*log.lock(), [(3, NEWS)]);
    }

    #[test]
    fn unlock_scheduler_triggers_pending_work() {
        let fw = framework();
        let log = log();
        fw.start_active(priority!(3), 4, Recorder::new(&log));
        fw.start_active(priority!(6), 4, Recorder::new(&log));
        let kernel = QkKernel::new(Arc::clone(&fw));

        let status = kernel.sched_lock(4);
        kernel.isr(|fw| {
            fw.post(priority!(3), EventRef::from_signal(NEWS));
            fw.post(priority!(6), EventRef::from_signal(NEWS));
        });
        assert_eq!(*log.lock(), [(6, NEWS)]);
        assert!(!kernel.has_pending_work());

        kernel.sched_unlock(status);
        assert_eq!(*log.lock(), [(6, NEWS), (3, NEWS)]);
    }

    #[test]
    fn publish_and_run_delivers_to_all_subscribers() {
        let fw = framework();
        let log = log();
        for p in [priority!(2), priority!(9), priority!(5)] {
            let mut rec = Recorder::new(&log);
            rec.subscribe = Some(NEWS);
            fw.start_active(p, 4, rec);
        }
        let kernel = QkKernel::new(Arc::clone(&fw));

        kernel.isr(|fw| fw.publish(fw.new_event(NEWS, &[1])));

        assert_eq!(*log.lock(), [(9, NEWS), (5, NEWS), (2, NEWS)]);
        assert_eq!(fw.pool_free(1), 4);
    }

    #[test]
    fn has_pending_work_tracks_ready_set() {
        let fw = framework();
        let log = log();
        fw.start_active(priority!(1), 4, Recorder::new(&log));
        let kernel = QkKernel::new(Arc::clone(&fw));

        assert!(!kernel.has_pending_work());
        fw.post(priority!(1), EventRef::from_signal(NEWS));
        assert!(kernel.has_pending_work());
        kernel.run_until_idle();
        assert!(!kernel.has_pending_work());
    }

    struct Yielding(Arc<AtomicUsize>);

    impl Hooks for Yielding {
        fn on_idle(&self) {
            thread::yield_now();
        }

        fn on_cleanup(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn interrupt_from_another_thread_wakes_the_idle_loop() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let fw = Framework::new(
            FrameworkConfig::builder()
                .max_signal(16)
                .hooks(Yielding(Arc::clone(&cleanups)))
                .build(),
        );
        let log = log();
        fw.start_active(priority!(4), 4, Recorder::new(&log));
        let kernel = Arc::new(QkKernel::new(Arc::clone(&fw)));

        let device = {
            let kernel = Arc::clone(&kernel);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                kernel.isr(|fw| fw.post(priority!(4), EventRef::from_signal(NEWS)));
                while log.lock().is_empty() {
                    thread::yield_now();
                }
                kernel.framework().stop();
            })
        };

        kernel.run();
        device.join().unwrap();

        assert_eq!(*log.lock(), [(4, NEWS)]);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }
}
