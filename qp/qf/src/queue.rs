//! Private event queues of active objects and threads

use alloc::collections::VecDeque;

use qp_core::{q_assert, q_require};
use qp_mem::EventRef;

/// Bounded queue of event references.
///
/// Capacity is fixed when the owner starts. The queue keeps the low-water
/// mark of free entries so an application can size its queues from a trace
/// of a real run.
pub struct EventQueue {
    ring: VecDeque<EventRef>,
    capacity: usize,
    min_free: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        q_require!(100, capacity > 0);
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            min_free: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn n_free(&self) -> usize {
        self.capacity - self.ring.len()
    }

    /// Fewest free entries ever observed
    pub fn min_free(&self) -> usize {
        self.min_free
    }

    /// Appends at the tail. The caller has checked for room.
    pub fn push_back(&mut self, e: EventRef) {
        q_assert!(200, self.ring.len() < self.capacity);
        self.ring.push_back(e);
        self.note_free();
    }

    /// Inserts at the head, ahead of everything already queued.
    pub fn push_front(&mut self, e: EventRef) {
        q_assert!(201, self.ring.len() < self.capacity);
        self.ring.push_front(e);
        self.note_free();
    }

    pub fn pop_front(&mut self) -> Option<EventRef> {
        self.ring.pop_front()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = EventRef> + '_ {
        self.ring.drain(..)
    }

    fn note_free(&mut self) {
        let free = self.n_free();
        if free < self.min_free {
            self.min_free = free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_core::Signal;

    fn sig(n: u16) -> EventRef {
        EventRef::from_signal(Signal(n))
    }

    #[test]
    fn fifo_with_lifo_overtaking() {
        let mut q = EventQueue::new(4);
        q.push_back(sig(10));
        q.push_back(sig(11));
        q.push_front(sig(12));

        let order: Vec<u16> = core::iter::from_fn(|| q.pop_front())
            .map(|e| e.signal().raw())
            .collect();
        assert_eq!(order, [12, 10, 11]);
    }

    #[test]
    fn low_water_mark_survives_draining() {
        let mut q = EventQueue::new(3);
        q.push_back(sig(10));
        q.push_back(sig(11));
        assert_eq!(q.n_free(), 1);
        q.pop_front();
        q.pop_front();
        assert_eq!(q.n_free(), 3);
        assert_eq!(q.min_free(), 1);
    }

    #[test]
    #[should_panic]
    fn push_into_full_queue_is_fatal() {
        let mut q = EventQueue::new(1);
        q.push_back(sig(10));
        q.push_back(sig(11));
    }
}
