//! The framework context shared by every kernel.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use qp_core::{q_assert, q_error, q_require, Hooks, Priority, PrioritySet, Signal};
use qp_mem::{EventRef, PoolSet, NO_MARGIN};
use qp_qep::Hsm;
use qp_qs::{qs_ids, Record, RecordBuilder, Tracer};

use crate::active::{ActiveContext, ActiveObject, ActiveObjectRef, ActiveRunnable};
use crate::config::FrameworkConfig;
use crate::error::PostError;
use crate::event::{Event, MAX_EVENT_PAYLOAD};
use crate::queue::EventQueue;
use crate::time::TimerTable;
use crate::trace::RecordExt;

/// Result of [`Framework::sched_lock`], handed back to
/// [`Framework::sched_unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedStatus {
    /// The ceiling was raised; holds the previous ceiling.
    Locked(u8),
    /// The requested ceiling was not above the current one.
    Unlocked,
}

/// Occupant of one priority level.
pub(crate) struct Registered {
    pub(crate) queue: EventQueue,
    /// `None` for extended threads, which read their queue themselves.
    pub(crate) runnable: Option<ActiveObjectRef>,
}

pub(crate) struct Shared {
    pub(crate) registry: Vec<Option<Registered>>,
    pub(crate) ready: PrioritySet,
    pub(crate) pools: PoolSet,
    pub(crate) subscribers: Vec<PrioritySet>,
    pub(crate) timers: TimerTable,
    pub(crate) ceiling: u8,
    pub(crate) timed_out: PrioritySet,
    /// Levels claimed by priority-ceiling mutexes
    pub(crate) reserved: PrioritySet,
    /// By ceiling: the thread running there while it holds the mutex
    pub(crate) holders: Vec<Option<Priority>>,
    /// By start priority: the ceiling a thread has been raised to
    pub(crate) raised: Vec<Option<Priority>>,
}

impl Shared {
    fn slot(&mut self, prio: Priority) -> &mut Registered {
        match self.registry.get_mut(prio.raw() as usize) {
            Some(Some(reg)) => reg,
            _ => q_error!(100),
        }
    }

    fn ref_count(&self, e: EventRef) -> u8 {
        e.pooled().map(|h| self.pools.ref_count(h)).unwrap_or(0)
    }

    /// Level `prio` is scheduled at: its ceiling while it holds a mutex.
    fn effective(&self, prio: Priority) -> Priority {
        self.raised
            .get(prio.raw() as usize)
            .copied()
            .flatten()
            .unwrap_or(prio)
    }

    fn mark_ready(&mut self, prio: Priority) {
        let level = self.effective(prio);
        self.ready.insert(level);
    }
}

/// A static payload has to fit an [`Event`]; pool blocks are checked in
/// [`Framework::new`].
fn check_payload(e: EventRef) {
    if let EventRef::Static { payload, .. } = e {
        q_require!(330, payload.len() <= MAX_EVENT_PAYLOAD);
    }
}

/// Active-object framework: registry, ready-set, event pools, subscriber
/// lists and time events behind one critical section.
///
/// Created once at start-up with [`Framework::new`] and shared by the
/// kernel, the active objects and any interrupt-level code.
pub struct Framework {
    config: FrameworkConfig,
    shared: Mutex<RefCell<Shared>>,
    stopped: AtomicBool,
}

impl Framework {
    pub fn new(config: FrameworkConfig) -> Arc<Self> {
        config.validate();

        let mut pools = PoolSet::new();
        for spec in &config.pools {
            q_require!(110, spec.block_size <= MAX_EVENT_PAYLOAD);
            pools.init_pool(spec.block_size, spec.n_blocks);
        }

        let levels = config.max_active as usize + 1;
        let mut registry = Vec::new();
        registry.resize_with(levels, || None);

        let shared = Shared {
            registry,
            ready: PrioritySet::new(),
            pools,
            subscribers: alloc::vec![PrioritySet::new(); config.max_signal as usize],
            timers: TimerTable::new(config.tick_rates),
            ceiling: 0,
            timed_out: PrioritySet::new(),
            reserved: PrioritySet::new(),
            holders: alloc::vec![None; levels],
            raised: alloc::vec![None; levels],
        };

        log::info!(
            "{}: framework up, {} priorities, {} signals, {} pools, {} tick rates",
            config.name,
            config.max_active,
            config.max_signal,
            config.pools.len(),
            config.tick_rates
        );
        if let Some(tracer) = &config.tracer {
            tracer.target_info(&config.to_target_info());
        }

        Arc::new(Self {
            config,
            shared: Mutex::new(RefCell::new(shared)),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn hooks(&self) -> &dyn Hooks {
        &*self.config.hooks
    }

    pub fn tracer(&self) -> Option<&Tracer> {
        self.config.tracer.as_deref()
    }

    /// Starts a record when tracing is configured and the filters pass.
    pub fn trace(&self, record: Record, qs_id: u8) -> Option<RecordBuilder<'_>> {
        self.config.tracer.as_ref()?.begin(record, qs_id)
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    // ----- active objects ---------------------------------------------------

    /// Registers an active object at `prio` with a queue of `queue_len`
    /// entries and runs its top-most initial transition.
    ///
    /// Events posted during the initial transition stay queued until the
    /// kernel runs.
    pub fn start_active<H>(
        self: &Arc<Self>,
        prio: Priority,
        queue_len: usize,
        hsm: H,
    ) -> Arc<ActiveObject<H>>
    where
        H: Hsm<Event = Event, Context = ActiveContext> + Send + 'static,
        H::State: Send,
    {
        let ao = ActiveObject::new(prio, hsm);
        self.register(prio, queue_len, Some(ao.clone() as ActiveObjectRef));

        if let Some(tracer) = self.tracer() {
            tracer.obj_dict(prio.raw() as u64, ao.name());
        }
        log::debug!("active object {} started at {}", ao.name(), prio);

        let mut ctx = ActiveContext::new(Arc::clone(self), prio, None);
        ao.start(&mut ctx);
        ao
    }

    /// Claims `prio` for an extended thread; its queue is read with
    /// [`thread_get`](Self::thread_get). The thread starts out ready.
    pub fn register_thread(&self, prio: Priority, queue_len: usize) {
        self.register(prio, queue_len, None);
        self.make_ready(prio);
    }

    fn register(&self, prio: Priority, queue_len: usize, runnable: Option<ActiveObjectRef>) {
        q_require!(200, prio.is_valid() && prio.raw() <= self.config.max_active);
        self.with(|sh| {
            q_require!(202, !sh.reserved.contains(prio));
            let slot = &mut sh.registry[prio.raw() as usize];
            q_require!(201, slot.is_none());
            *slot = Some(Registered {
                queue: EventQueue::new(queue_len),
                runnable,
            });
        });
    }

    /// Releases `prio`, recycling anything left in its queue and dropping
    /// its subscriptions.
    pub fn unregister(&self, prio: Priority) {
        let leftovers: Vec<EventRef> = self.with(|sh| {
            let Some(mut reg) = sh.registry.get_mut(prio.raw() as usize).and_then(Option::take)
            else {
                q_error!(210)
            };
            sh.ready.remove(prio);
            sh.timed_out.remove(prio);
            if let Some(ceiling) = sh.raised[prio.raw() as usize].take() {
                sh.holders[ceiling.raw() as usize] = None;
                sh.ready.remove(ceiling);
            }
            for subs in sh.subscribers.iter_mut() {
                subs.remove(prio);
            }
            reg.queue.drain().collect()
        });
        for e in leftovers {
            self.gc(e);
        }
        log::debug!("{prio} released");
    }

    pub fn is_registered(&self, prio: Priority) -> bool {
        self.with(|sh| matches!(sh.registry.get(prio.raw() as usize), Some(Some(_))))
    }

    /// Low-water mark of free entries in the queue at `prio`
    pub fn queue_min(&self, prio: Priority) -> usize {
        self.with(|sh| sh.slot(prio).queue.min_free())
    }

    pub fn queue_len(&self, prio: Priority) -> usize {
        self.with(|sh| sh.slot(prio).queue.len())
    }

    // ----- posting ----------------------------------------------------------

    /// Posts `e` to the queue at `target`. Overflow is fatal.
    pub fn post(&self, target: Priority, e: EventRef) {
        if self.post_x(target, e, NO_MARGIN).is_err() {
            q_error!(300);
        }
    }

    /// Posts `e` unless that would leave `margin` or fewer free entries.
    ///
    /// On failure an event nobody else references goes back to its pool.
    pub fn post_x(&self, target: Priority, e: EventRef, margin: u16) -> Result<(), PostError> {
        check_payload(e);
        let posted = self.with(|sh| {
            let free = sh.slot(target).queue.n_free();
            let ok = if margin == NO_MARGIN {
                q_assert!(310, free > 0);
                true
            } else {
                free > margin as usize
            };

            if ok {
                if let Some(h) = e.pooled() {
                    sh.pools.inc_ref(h);
                }
                let ref_count = sh.ref_count(e);
                let reg = sh.slot(target);
                reg.queue.push_back(e);
                let (free, min) = (reg.queue.n_free(), reg.queue.min_free());
                sh.mark_ready(target);
                if let Some(rec) = self.trace(Record::ActivePost, target.raw()) {
                    rec.u8(target.raw())
                        .event(e, ref_count)
                        .u16(free as u16)
                        .u16(min as u16)
                        .end();
                }
            } else {
                if let Some(rec) = self.trace(Record::ActivePostAttempt, target.raw()) {
                    rec.u8(target.raw())
                        .event(e, sh.ref_count(e))
                        .u16(free as u16)
                        .u16(margin)
                        .end();
                }
                if let Some(h) = e.pooled() {
                    if sh.pools.ref_count(h) == 0 {
                        sh.pools.release(h);
                    }
                }
            }
            ok
        });

        if posted {
            Ok(())
        } else {
            log::warn!("post of {} to {} refused", e.signal(), target);
            Err(PostError::queue_full(target, e.signal(), margin))
        }
    }

    /// Posts `e` at the head of the queue, ahead of everything queued.
    /// Overflow is fatal.
    pub fn post_lifo(&self, target: Priority, e: EventRef) {
        check_payload(e);
        self.with(|sh| {
            q_assert!(320, sh.slot(target).queue.n_free() > 0);
            if let Some(h) = e.pooled() {
                sh.pools.inc_ref(h);
            }
            let ref_count = sh.ref_count(e);
            let reg = sh.slot(target);
            reg.queue.push_front(e);
            let (free, min) = (reg.queue.n_free(), reg.queue.min_free());
            sh.mark_ready(target);
            if let Some(rec) = self.trace(Record::ActivePostLifo, target.raw()) {
                rec.u8(target.raw())
                    .event(e, ref_count)
                    .u16(free as u16)
                    .u16(min as u16)
                    .end();
            }
        });
    }

    // ----- dispatch ---------------------------------------------------------

    /// Runs one event of the active object at `prio` to completion.
    ///
    /// Returns `false` when there was nothing to do. The critical section
    /// is released before the state machine runs.
    pub fn dispatch(self: &Arc<Self>, prio: Priority) -> bool {
        let taken = self.with(|sh| {
            let reg = sh.registry.get_mut(prio.raw() as usize)?.as_mut()?;
            let runnable = reg.runnable.clone()?;
            let Some(e) = reg.queue.pop_front() else {
                sh.ready.remove(prio);
                return None;
            };
            let drained = reg.queue.is_empty();
            let free = reg.queue.n_free();
            if drained {
                sh.ready.remove(prio);
            }
            let ref_count = sh.ref_count(e);
            let record = if drained {
                Record::ActiveGetLast
            } else {
                Record::ActiveGet
            };
            if let Some(rec) = self.trace(record, prio.raw()) {
                rec.u8(prio.raw()).event(e, ref_count).u16(free as u16).end();
            }
            let event = Event::load(e, &sh.pools);
            Some((runnable, e, event))
        });

        let Some((runnable, e, event)) = taken else {
            return false;
        };
        let mut ctx = ActiveContext::new(Arc::clone(self), prio, Some(e));
        runnable.dispatch(&mut ctx, &event);
        self.gc(e);
        true
    }

    /// Takes the head of an extended thread's queue.
    pub fn thread_get(&self, prio: Priority) -> Option<(EventRef, Event)> {
        self.with(|sh| {
            let reg = sh.slot(prio);
            q_require!(400, reg.runnable.is_none());
            let e = reg.queue.pop_front()?;
            let free = reg.queue.n_free();
            let ref_count = sh.ref_count(e);
            if let Some(rec) = self.trace(Record::ActiveGet, prio.raw()) {
                rec.u8(prio.raw()).event(e, ref_count).u16(free as u16).end();
            }
            Some((e, Event::load(e, &sh.pools)))
        })
    }

    // ----- ready-set and scheduler lock -------------------------------------

    /// Highest ready priority above both `floor` and the scheduler-lock
    /// ceiling.
    pub fn next_ready(&self, floor: u8) -> Option<Priority> {
        self.with(|sh| {
            let floor = floor.max(sh.ceiling);
            sh.ready.find_max().filter(|p| p.raw() > floor)
        })
    }

    pub fn is_ready(&self, prio: Priority) -> bool {
        self.with(|sh| sh.ready.contains(sh.effective(prio)))
    }

    pub fn has_ready(&self) -> bool {
        self.with(|sh| !sh.ready.is_empty())
    }

    /// Marks `prio` ready without posting. Used to unblock threads.
    pub fn make_ready(&self, prio: Priority) {
        self.with(|sh| sh.mark_ready(prio));
    }

    pub fn clear_ready(&self, prio: Priority) {
        self.with(|sh| {
            let level = sh.effective(prio);
            sh.ready.remove(level);
        });
    }

    /// Consumes the timeout flag of the thread at `prio`.
    pub fn take_timeout(&self, prio: Priority) -> bool {
        self.with(|sh| {
            let hit = sh.timed_out.contains(prio);
            sh.timed_out.remove(prio);
            hit
        })
    }

    pub(crate) fn flag_timeout(&self, prio: Priority) {
        self.with(|sh| {
            sh.timed_out.insert(prio);
            sh.mark_ready(prio);
        });
    }

    /// Raises the scheduler-lock ceiling to `ceiling`.
    ///
    /// While locked, kernels activate nothing at or below the ceiling.
    pub fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.with(|sh| {
            if ceiling > sh.ceiling {
                let prev = sh.ceiling;
                sh.ceiling = ceiling;
                if let Some(rec) = self.trace(Record::SchedLock, 0) {
                    rec.u8(prev).u8(ceiling).end();
                }
                SchedStatus::Locked(prev)
            } else {
                SchedStatus::Unlocked
            }
        })
    }

    pub fn sched_unlock(&self, status: SchedStatus) {
        if let SchedStatus::Locked(prev) = status {
            self.with(|sh| {
                q_require!(500, sh.ceiling > prev);
                if let Some(rec) = self.trace(Record::SchedUnlock, 0) {
                    rec.u8(sh.ceiling).u8(prev).end();
                }
                sh.ceiling = prev;
            });
        }
    }

    pub fn lock_ceiling(&self) -> u8 {
        self.with(|sh| sh.ceiling)
    }

    // ----- priority ceilings -----------------------------------------------

    /// Claims `ceiling` for a priority-ceiling mutex. Nothing can be
    /// registered at that level afterwards.
    pub fn reserve_ceiling(&self, ceiling: Priority) {
        q_require!(800, ceiling.is_valid() && ceiling.raw() <= self.config.max_active);
        self.with(|sh| {
            let free = sh.registry[ceiling.raw() as usize].is_none();
            q_require!(801, free && !sh.reserved.contains(ceiling));
            sh.reserved.insert(ceiling);
        });
        log::debug!("{ceiling} reserved as a mutex ceiling");
    }

    /// Schedules the thread at `start` at `ceiling` until
    /// [`restore`](Self::restore). A pending ready bit moves along.
    pub fn raise(&self, start: Priority, ceiling: Priority) {
        self.with(|sh| {
            q_require!(810, start < ceiling && sh.reserved.contains(ceiling));
            let (s, c) = (start.raw() as usize, ceiling.raw() as usize);
            q_require!(811, sh.holders[c].is_none() && sh.raised[s].is_none());
            sh.holders[c] = Some(start);
            sh.raised[s] = Some(ceiling);
            if sh.ready.contains(start) {
                sh.ready.remove(start);
                sh.ready.insert(ceiling);
            }
        });
    }

    /// Puts a raised thread back at its start priority.
    pub fn restore(&self, start: Priority) {
        self.with(|sh| {
            let Some(ceiling) = sh.raised[start.raw() as usize].take() else {
                q_error!(820)
            };
            sh.holders[ceiling.raw() as usize] = None;
            if sh.ready.contains(ceiling) {
                sh.ready.remove(ceiling);
                sh.ready.insert(start);
            }
        });
    }

    /// Thread running at `level` because it holds that level's mutex
    pub fn ceiling_holder(&self, level: Priority) -> Option<Priority> {
        self.with(|sh| sh.holders.get(level.raw() as usize).copied().flatten())
    }

    /// Level `prio` is scheduled at right now
    pub fn effective_priority(&self, prio: Priority) -> Priority {
        self.with(|sh| sh.effective(prio))
    }

    // ----- events -----------------------------------------------------------

    /// Draws an event from the smallest pool that fits `payload`.
    /// Exhaustion is fatal.
    pub fn new_event(&self, signal: Signal, payload: &[u8]) -> EventRef {
        match self.new_event_x(signal, payload, NO_MARGIN) {
            Some(e) => e,
            None => q_error!(600),
        }
    }

    /// Like [`new_event`](Self::new_event) but returns `None` when taking a
    /// block would leave `margin` or fewer free.
    pub fn new_event_x(&self, signal: Signal, payload: &[u8], margin: u16) -> Option<EventRef> {
        self.with(|sh| {
            let e = sh.pools.alloc(signal, payload, margin);
            match e {
                Some(e) => {
                    let pool_id = e.pool_id();
                    let stats = sh.pools.stats(pool_id);
                    if let Some(rec) = self.trace(Record::MpoolGet, qs_ids::pool(pool_id)) {
                        rec.u8(pool_id)
                            .u16(stats.free_blocks as u16)
                            .u16(stats.min_free_blocks as u16)
                            .end();
                    }
                    if let Some(rec) = self.trace(Record::New, 0) {
                        rec.signal(signal).u16(payload.len() as u16).end();
                    }
                }
                None => {
                    if let Some(rec) = self.trace(Record::NewAttempt, 0) {
                        rec.signal(signal).u16(payload.len() as u16).u16(margin).end();
                    }
                }
            }
            e
        })
    }

    /// Drops the caller's claim on `e`, recycling it once nobody holds it.
    pub fn gc(&self, e: EventRef) {
        let Some(h) = e.pooled() else {
            return;
        };
        self.with(|sh| {
            let count = sh.pools.ref_count(h);
            let freed = sh.pools.dec_ref(h);
            if freed {
                if let Some(rec) = self.trace(Record::Gc, 0) {
                    rec.event(e, count).end();
                }
                let stats = sh.pools.stats(h.pool_id());
                if let Some(rec) = self.trace(Record::MpoolPut, qs_ids::pool(h.pool_id())) {
                    rec.u8(h.pool_id()).u16(stats.free_blocks as u16).end();
                }
            } else if let Some(rec) = self.trace(Record::GcAttempt, 0) {
                rec.event(e, count).end();
            }
        });
    }

    /// Adds a reference so `e` survives past the current dispatch.
    pub fn new_ref(&self, e: EventRef) -> EventRef {
        let Some(h) = e.pooled() else {
            return e;
        };
        self.with(|sh| {
            let count = sh.pools.inc_ref(h);
            if let Some(rec) = self.trace(Record::NewRef, 0) {
                rec.event(e, count).end();
            }
        });
        e
    }

    /// Drops a reference taken with [`new_ref`](Self::new_ref).
    pub fn delete_ref(&self, e: EventRef) {
        if let Some(h) = e.pooled() {
            self.with(|sh| {
                if let Some(rec) = self.trace(Record::DeleteRef, 0) {
                    rec.event(e, sh.pools.ref_count(h)).end();
                }
            });
        }
        self.gc(e);
    }

    /// Number of queues (plus explicit references) holding `e`
    pub fn ref_count(&self, e: EventRef) -> u8 {
        self.with(|sh| sh.ref_count(e))
    }

    /// Lowest number of free blocks pool `pool_id` has had
    pub fn pool_min(&self, pool_id: u8) -> usize {
        self.with(|sh| sh.pools.min_free(pool_id))
    }

    pub fn pool_free(&self, pool_id: u8) -> usize {
        self.with(|sh| sh.pools.stats(pool_id).free_blocks)
    }

    pub fn pool_max_block_size(&self) -> usize {
        self.with(|sh| sh.pools.max_block_size())
    }

    pub(crate) fn pools_dec_ref_held(&self, e: EventRef) {
        if let Some(h) = e.pooled() {
            self.with(|sh| sh.pools.dec_ref_held(h));
        }
    }

    // ----- publish/subscribe ------------------------------------------------

    fn check_signal(&self, signal: Signal) {
        q_require!(700, signal >= Signal::USER && signal.raw() < self.config.max_signal);
    }

    pub fn subscribe(&self, prio: Priority, signal: Signal) {
        self.check_signal(signal);
        self.with(|sh| {
            sh.slot(prio);
            sh.subscribers[signal.raw() as usize].insert(prio);
            if let Some(rec) = self.trace(Record::ActiveSubscribe, prio.raw()) {
                rec.u8(prio.raw()).signal(signal).end();
            }
        });
    }

    pub fn unsubscribe(&self, prio: Priority, signal: Signal) {
        self.check_signal(signal);
        self.with(|sh| {
            sh.slot(prio);
            sh.subscribers[signal.raw() as usize].remove(prio);
            if let Some(rec) = self.trace(Record::ActiveUnsubscribe, prio.raw()) {
                rec.u8(prio.raw()).signal(signal).end();
            }
        });
    }

    pub fn unsubscribe_all(&self, prio: Priority) {
        self.with(|sh| {
            sh.slot(prio);
            for (sig, subs) in sh.subscribers.iter_mut().enumerate() {
                if subs.contains(prio) {
                    subs.remove(prio);
                    if let Some(rec) = self.trace(Record::ActiveUnsubscribe, prio.raw()) {
                        rec.u8(prio.raw()).signal(Signal(sig as u16)).end();
                    }
                }
            }
        });
    }

    pub fn subscribers(&self, signal: Signal) -> PrioritySet {
        self.check_signal(signal);
        self.with(|sh| sh.subscribers[signal.raw() as usize])
    }

    /// Posts `e` to every subscriber of its signal, highest priority first.
    ///
    /// The scheduler is locked up to the highest subscriber for the
    /// duration of the fan-out, and an event no one subscribed to is
    /// recycled on the way out.
    pub fn publish(&self, e: EventRef) {
        let signal = e.signal();
        self.check_signal(signal);
        check_payload(e);

        let subs = self.with(|sh| {
            // hold the event while it fans out
            if let Some(h) = e.pooled() {
                sh.pools.inc_ref(h);
            }
            if let Some(rec) = self.trace(Record::Publish, 0) {
                rec.event(e, sh.ref_count(e)).end();
            }
            sh.subscribers[signal.raw() as usize]
        });

        if let Some(top) = subs.find_max() {
            let status = self.sched_lock(top.raw());
            for prio in subs.iter_descending() {
                self.post(prio, e);
            }
            self.sched_unlock(status);
        }
        self.gc(e);
    }

    // ----- lifecycle --------------------------------------------------------

    /// Asks the running kernel to leave its loop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        log::debug!("{}: stop requested", self.config.name);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
