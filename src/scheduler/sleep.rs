//! The timer wait set: fibers parked in [`crate::sleep`], ordered by wake
//! time so the scheduler step only has to look at the front to know how
//! long it can safely block in `poll`.

use crate::fiber::Tcb;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Instant;

struct Entry(Rc<Tcb>);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at() == other.wake_at()
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.wake_at().cmp(&other.wake_at())
    }
}
impl Entry {
    fn wake_at(&self) -> Instant {
        self.0.wake_at.get().expect("sleeping fiber without a wake time")
    }
}

/// A min-heap of sleeping fibers ordered by wake time.
#[derive(Default)]
pub struct SleepList {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl SleepList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tcb: Rc<Tcb>) {
        self.heap.push(Reverse(Entry(tcb)));
    }

    /// Drains every fiber whose wake time has passed, returning them in
    /// wake-time order.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<Rc<Tcb>> {
        let mut woken = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.wake_at() > now {
                break;
            }
            let Reverse(Entry(tcb)) = self.heap.pop().unwrap();
            woken.push(tcb);
        }
        woken
    }

    /// How long until the earliest sleeper wakes, or `None` if nobody is
    /// sleeping. Used to bound the scheduler's `poll` timeout.
    pub fn next_wake_in(&self, now: Instant) -> Option<std::time::Duration> {
        self.heap
            .peek()
            .map(|Reverse(e)| e.wake_at().saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::fiber::FiberId;
    use crate::stack::Stack;
    use std::time::Duration;

    fn make_tcb(id: u64, wake_in: Duration, now: Instant) -> Rc<Tcb> {
        let stack = Stack::new(crate::stack::DEFAULT_STACK_SIZE).unwrap();
        let ctx = Context::new(stack.top(), std::ptr::null_mut());
        let tcb = Tcb::new(FiberId(id), ctx, stack, 100, None);
        tcb.wake_at.set(Some(now + wake_in));
        tcb
    }

    #[test]
    fn drains_only_expired_entries_in_order() {
        let now = Instant::now();
        let mut list = SleepList::new();
        list.push(make_tcb(1, Duration::from_millis(50), now));
        list.push(make_tcb(2, Duration::from_millis(10), now));
        list.push(make_tcb(3, Duration::from_millis(200), now));

        let woken = list.drain_expired(now + Duration::from_millis(60));
        assert_eq!(woken.len(), 2);
        assert_eq!(woken[0].id, FiberId(2));
        assert_eq!(woken[1].id, FiberId(1));
        assert_eq!(list.len(), 1);
    }
}
