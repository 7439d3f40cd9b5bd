//! Deferring and recalling events

use heapless::Deque;
use qp_mem::EventRef;
use qp_qs::Record;

use crate::active::ActiveContext;
use crate::error::DeferError;
use crate::trace::RecordExt;

/// Holding area for events an active object cannot handle in its current
/// state.
///
/// The queue keeps a reference on every event it holds, so a deferred
/// pooled event survives the dispatch that deferred it.
pub struct DeferQueue<const N: usize> {
    events: Deque<EventRef, N>,
}

impl<const N: usize> Default for DeferQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DeferQueue<N> {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Keeps `e` for a later [`recall`](Self::recall).
    pub fn defer(&mut self, ctx: &ActiveContext, e: EventRef) -> Result<(), DeferError> {
        let fw = ctx.framework();
        let me = ctx.me().raw();
        if self.events.is_full() {
            let ref_count = fw.ref_count(e);
            if let Some(rec) = fw.trace(Record::ActiveDeferAttempt, me) {
                rec.u8(me).event(e, ref_count).end();
            }
            log::warn!("defer queue of {} full, {} dropped", ctx.me(), e.signal());
            return Err(DeferError::Full { signal: e.signal() });
        }
        let e = fw.new_ref(e);
        // room was checked above
        let _ = self.events.push_back(e);
        let ref_count = fw.ref_count(e);
        if let Some(rec) = fw.trace(Record::ActiveDefer, me) {
            rec.u8(me).event(e, ref_count).end();
        }
        Ok(())
    }

    /// Re-posts the oldest deferred event to the front of the caller's own
    /// queue. Returns whether there was one.
    pub fn recall(&mut self, ctx: &ActiveContext) -> bool {
        let fw = ctx.framework();
        let me = ctx.me();
        let Some(e) = self.events.pop_front() else {
            if let Some(rec) = fw.trace(Record::ActiveRecallAttempt, me.raw()) {
                rec.u8(me.raw()).end();
            }
            return false;
        };
        fw.post_lifo(me, e);
        // the queue now holds it; drop the reference this queue kept
        fw.pools_dec_ref_held(e);
        let ref_count = fw.ref_count(e);
        if let Some(rec) = fw.trace(Record::ActiveRecall, me.raw()) {
            rec.u8(me.raw()).event(e, ref_count).end();
        }
        true
    }

    /// Drops every deferred event. Returns how many there were.
    pub fn flush_deferred(&mut self, ctx: &ActiveContext) -> usize {
        let fw = ctx.framework();
        let mut n = 0;
        while let Some(e) = self.events.pop_front() {
            fw.gc(e);
            n += 1;
        }
        n
    }
}
