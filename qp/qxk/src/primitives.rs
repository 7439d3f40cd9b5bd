//! Blocking primitives for extended threads.
//!
//! Waiters are served in priority order, never FIFO. A wait with a tick
//! count of `0` blocks until it succeeds. A [`Mutex`] owns a ceiling
//! priority level and its owner runs at that level, so nothing between the
//! owner and the ceiling preempts it while it holds the mutex.

use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Poll, Waker};

use qp_core::{q_require, Priority, PrioritySet, TickCtr};
use qp_qf::Framework;
use qp_qs::Record;
use thiserror::Error;

use crate::thread::ThreadContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("wait timed out")]
    Timeout,
    #[error("semaphore is already at its maximum count")]
    Overflow,
    #[error("mutex is not owned by {0}")]
    NotOwner(Priority),
}

struct Waiter {
    prio: Priority,
    waker: Waker,
}

/// Blocked threads of one primitive.
#[derive(Default)]
struct WaitList {
    waiters: Vec<Waiter>,
}

impl WaitList {
    /// Adds `prio`, or refreshes its waker if it is already waiting.
    fn park(&mut self, prio: Priority, waker: &Waker) {
        match self.waiters.iter_mut().find(|w| w.prio == prio) {
            Some(w) => w.waker.clone_from(waker),
            None => self.waiters.push(Waiter {
                prio,
                waker: waker.clone(),
            }),
        }
    }

    fn leave(&mut self, prio: Priority) {
        self.waiters.retain(|w| w.prio != prio);
    }

    /// Removes and returns the highest-priority waiter.
    fn pop_highest(&mut self) -> Option<Waiter> {
        let (i, _) = self
            .waiters
            .iter()
            .enumerate()
            .max_by_key(|(_, w)| w.prio)?;
        Some(self.waiters.swap_remove(i))
    }

    fn len(&self) -> usize {
        self.waiters.len()
    }
}

struct SemState {
    count: u16,
    max: u16,
    waiting: WaitList,
    /// Waiters a signal was handed to directly
    granted: PrioritySet,
}

/// Counting semaphore.
///
/// Clones share the same count.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<spin::Mutex<SemState>>,
}

impl Semaphore {
    pub fn new(count: u16, max: u16) -> Self {
        q_require!(300, max != 0 && count <= max);
        Self {
            inner: Arc::new(spin::Mutex::new(SemState {
                count,
                max,
                waiting: WaitList::default(),
                granted: PrioritySet::default(),
            })),
        }
    }

    pub fn binary() -> Self {
        Self::new(0, 1)
    }

    pub fn count(&self) -> u16 {
        self.inner.lock().count
    }

    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    /// Takes the semaphore, blocking up to `ticks` ticks.
    pub async fn wait(&self, ctx: &ThreadContext, ticks: TickCtr) -> Result<(), SyncError> {
        let me = ctx.me();
        let mut blocked = false;
        poll_fn(|cx| {
            let mut s = self.inner.lock();
            let taken = if s.granted.contains(me) {
                s.granted.remove(me);
                true
            } else if s.count > 0 {
                s.count -= 1;
                s.waiting.leave(me);
                true
            } else {
                false
            };
            if taken {
                let count = s.count;
                drop(s);
                if blocked {
                    ctx.end_wait();
                }
                if let Some(rec) = ctx.framework().trace(Record::SemTake, me.raw()) {
                    rec.u8(me.raw()).u16(count).end();
                }
                return Poll::Ready(Ok(()));
            }

            if blocked && ctx.take_timeout() {
                s.waiting.leave(me);
                return Poll::Ready(Err(SyncError::Timeout));
            }

            s.waiting.park(me, cx.waker());
            if !blocked {
                blocked = true;
                let count = s.count;
                drop(s);
                ctx.begin_wait(ticks);
                if let Some(rec) = ctx.framework().trace(Record::SemBlock, me.raw()) {
                    rec.u8(me.raw()).u16(count).end();
                }
            }
            Poll::Pending
        })
        .await
    }

    /// Takes the semaphore if that does not block.
    pub fn try_wait(&self) -> bool {
        let mut s = self.inner.lock();
        if s.count > 0 {
            s.count -= 1;
            true
        } else {
            false
        }
    }

    /// Releases one unit. A waiting thread, the highest-priority one,
    /// receives it directly; otherwise the count goes up.
    ///
    /// Callable from threads, active objects and interrupts.
    pub fn signal(&self) -> Result<(), SyncError> {
        let mut s = self.inner.lock();
        if let Some(w) = s.waiting.pop_highest() {
            s.granted.insert(w.prio);
            drop(s);
            w.waker.wake();
            return Ok(());
        }
        if s.count >= s.max {
            return Err(SyncError::Overflow);
        }
        s.count += 1;
        Ok(())
    }
}

struct MutexState {
    owner: Option<Priority>,
    nesting: u8,
    waiting: WaitList,
}

/// Priority-ceiling mutex between extended threads, lockable again by its
/// owner.
///
/// Clones share the same lock.
#[derive(Clone)]
pub struct Mutex {
    inner: Arc<spin::Mutex<MutexState>>,
    ceiling: Priority,
}

impl Mutex {
    /// Creates a mutex with `ceiling` as its priority ceiling.
    ///
    /// The ceiling level is reserved in `fw` for good and has to be above
    /// every thread that uses the mutex.
    pub fn new(fw: &Framework, ceiling: Priority) -> Self {
        fw.reserve_ceiling(ceiling);
        Self {
            inner: Arc::new(spin::Mutex::new(MutexState {
                owner: None,
                nesting: 0,
                waiting: WaitList::default(),
            })),
            ceiling,
        }
    }

    pub fn ceiling(&self) -> Priority {
        self.ceiling
    }

    pub fn owner(&self) -> Option<Priority> {
        self.inner.lock().owner
    }

    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    /// Locks the mutex, blocking up to `ticks` ticks. The owner locking
    /// again only nests.
    pub async fn lock(&self, ctx: &ThreadContext, ticks: TickCtr) -> Result<(), SyncError> {
        let me = ctx.me();
        q_require!(402, me < self.ceiling);
        let mut blocked = false;
        poll_fn(|cx| {
            let mut m = self.inner.lock();
            let owner = m.owner;
            match owner {
                None => {
                    m.owner = Some(me);
                    m.nesting = 1;
                    m.waiting.leave(me);
                    ctx.framework().raise(me, self.ceiling);
                }
                // handed over by `unlock` while we were blocked
                Some(owner) if owner == me && blocked => {}
                Some(owner) if owner == me => {
                    q_require!(400, m.nesting < u8::MAX);
                    m.nesting += 1;
                }
                Some(owner) => {
                    if blocked && ctx.take_timeout() {
                        m.waiting.leave(me);
                        return Poll::Ready(Err(SyncError::Timeout));
                    }
                    m.waiting.park(me, cx.waker());
                    if !blocked {
                        blocked = true;
                        drop(m);
                        ctx.begin_wait(ticks);
                        if let Some(rec) = ctx.framework().trace(Record::MtxBlock, me.raw()) {
                            rec.u8(me.raw()).u8(owner.raw()).end();
                        }
                    }
                    return Poll::Pending;
                }
            }
            let nesting = m.nesting;
            drop(m);
            if blocked {
                ctx.end_wait();
            }
            if let Some(rec) = ctx.framework().trace(Record::MtxLock, me.raw()) {
                rec.u8(me.raw()).u8(nesting).end();
            }
            Poll::Ready(Ok(()))
        })
        .await
    }

    /// Locks the mutex if that does not block.
    pub fn try_lock(&self, ctx: &ThreadContext) -> bool {
        let me = ctx.me();
        q_require!(403, me < self.ceiling);
        let mut m = self.inner.lock();
        let owner = m.owner;
        let locked = match owner {
            None => {
                m.owner = Some(me);
                m.nesting = 1;
                ctx.framework().raise(me, self.ceiling);
                true
            }
            Some(owner) if owner == me => {
                q_require!(401, m.nesting < u8::MAX);
                m.nesting += 1;
                true
            }
            Some(_) => false,
        };
        drop(m);
        if !locked {
            if let Some(rec) = ctx.framework().trace(Record::MtxLockAttempt, me.raw()) {
                rec.u8(me.raw()).end();
            }
        }
        locked
    }

    /// Undoes one level of locking. Releasing the last level drops the
    /// owner back to its own priority and hands the mutex, and the ceiling,
    /// to the highest-priority waiter.
    pub fn unlock(&self, ctx: &ThreadContext) -> Result<(), SyncError> {
        let me = ctx.me();
        let mut m = self.inner.lock();
        if m.owner != Some(me) {
            drop(m);
            if let Some(rec) = ctx.framework().trace(Record::MtxUnlockAttempt, me.raw()) {
                rec.u8(me.raw()).end();
            }
            return Err(SyncError::NotOwner(me));
        }

        m.nesting -= 1;
        let nesting = m.nesting;
        let next = if nesting == 0 {
            let fw = ctx.framework();
            fw.restore(me);
            let next = m.waiting.pop_highest();
            if let Some(w) = &next {
                fw.raise(w.prio, self.ceiling);
            }
            m.owner = next.as_ref().map(|w| w.prio);
            m.nesting = u8::from(next.is_some());
            next
        } else {
            None
        };
        drop(m);

        if let Some(rec) = ctx.framework().trace(Record::MtxUnlock, me.raw()) {
            rec.u8(me.raw()).u8(nesting).end();
        }
        if let Some(w) = next {
            w.waker.wake();
        }
        Ok(())
    }
}
