//! The stride-scheduled ready queue: a min-heap ordered by `pass`, so the
//! fiber with the smallest accumulated pass is always picked next.

use crate::fiber::Tcb;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

struct Entry(Rc<Tcb>);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.pass.get() == other.0.pass.get()
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.pass.get().cmp(&other.0.pass.get())
    }
}

/// Growable min-heap of ready-to-run fibers, ordered by ascending `pass`.
/// Unlike a fixed-capacity array this never rejects a push; the "ready
/// heap exhausted its capacity" error is reserved for deployments that
/// explicitly cap it via [`crate::SchedulerConfig::ready_heap_capacity`]
/// with growth disabled, which this implementation does not do by
/// default.
pub struct ReadyHeap {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl ReadyHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, tcb: Rc<Tcb>) {
        self.heap.push(Reverse(Entry(tcb)));
    }

    /// Removes and returns the fiber with the smallest `pass`.
    pub fn pop_min(&mut self) -> Option<Rc<Tcb>> {
        self.heap.pop().map(|Reverse(Entry(tcb))| tcb)
    }

    pub fn peek_min_pass(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.0.pass.get())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
