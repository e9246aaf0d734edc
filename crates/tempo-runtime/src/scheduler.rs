//! Cooperative single-threaded scheduler.
//!
//! The scheduler owns a queue of armed timers keyed by absolute logical time.
//! Objects hold [`Clock`] handles; arming a clock registers its callback at a
//! deadline, and the host moves time forward with [`Scheduler::advance_to`]
//! (logical time) or [`Scheduler::poll`] (monotonic time source). Callbacks run
//! synchronously inside those calls, one at a time, in deadline order.
//!
//! # Cancellation
//!
//! Each arming gets a fresh sequence number. The heap may still hold entries
//! for earlier armings; they are discarded when popped because the slot no
//! longer carries their sequence. Once [`Clock::unset`] (or a re-arm, or
//! dropping the clock) returns, the previous arming can never fire.
//!
//! # Re-entrancy
//!
//! No borrow of the queue is held while a callback runs, so callbacks may arm,
//! cancel, create, or drop clocks on the same scheduler.

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;
use tempo_common::config::{SchedulerConfig, TimeSourceKind};
use tempo_common::time::{clamp_delay, Millis};
use tracing::{debug, trace, warn};

type Callback = Rc<dyn Fn()>;

/// Source of the current time for a polling host.
pub trait TimeSource {
    /// Current time in milliseconds since an arbitrary origin.
    fn now(&self) -> Millis;
}

/// Time source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicSource {
    origin: Instant,
}

impl MonotonicSource {
    /// Start measuring from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicSource {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Millis,
    seq: u64,
    index: u32,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal deadlines fire in arming order.
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct TimerSlot {
    generation: u32,
    callback: Option<Callback>,
    /// Sequence and deadline of the live arming, if any.
    armed: Option<(u64, Millis)>,
}

struct TimerQueue {
    now: Millis,
    slots: Vec<TimerSlot>,
    free: Vec<u32>,
    heap: BinaryHeap<Reverse<Deadline>>,
    next_seq: u64,
    armed: usize,
    fired_total: u64,
    max_fires_per_advance: usize,
    source: Option<Box<dyn TimeSource>>,
}

impl TimerQueue {
    fn slot(&self, index: u32, generation: u32) -> Option<&TimerSlot> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation && slot.callback.is_some())
    }

    fn slot_mut(&mut self, index: u32, generation: u32) -> Option<&mut TimerSlot> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation && slot.callback.is_some())
    }

    fn alloc(&mut self, callback: Callback) -> (u32, u32) {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.callback = Some(callback);
            slot.armed = None;
            return (index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(TimerSlot {
            generation: 0,
            callback: Some(callback),
            armed: None,
        });
        (index, 0)
    }

    fn arm(&mut self, index: u32, generation: u32, at: Millis) {
        let seq = self.next_seq;
        let at = at.max(self.now);
        let Some(slot) = self.slot_mut(index, generation) else {
            return;
        };
        let was_armed = slot.armed.replace((seq, at)).is_some();
        self.next_seq += 1;
        if !was_armed {
            self.armed += 1;
        }
        self.heap.push(Reverse(Deadline { at, seq, index }));
    }

    fn disarm(&mut self, index: u32, generation: u32) -> bool {
        let Some(slot) = self.slot_mut(index, generation) else {
            return false;
        };
        let was_armed = slot.armed.take().is_some();
        if was_armed {
            self.armed -= 1;
        }
        was_armed
    }

    /// Free the slot and hand back its callback.
    ///
    /// The caller drops the callback once the queue is no longer borrowed,
    /// since it may own other clocks.
    fn release(&mut self, index: u32, generation: u32) -> Option<Callback> {
        self.disarm(index, generation);
        let slot = self.slot_mut(index, generation)?;
        let callback = slot.callback.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        callback
    }

    /// Pop the earliest live deadline at or before `limit`.
    fn pop_due(&mut self, limit: Millis) -> Option<Callback> {
        while let Some(Reverse(deadline)) = self.heap.peek().copied() {
            if deadline.at > limit {
                return None;
            }
            self.heap.pop();

            let slot = &mut self.slots[deadline.index as usize];
            let live = matches!(slot.armed, Some((seq, _)) if seq == deadline.seq);
            if !live {
                continue;
            }
            slot.armed = None;
            let callback = slot.callback.clone();
            self.armed -= 1;
            self.fired_total += 1;
            if deadline.at > self.now {
                self.now = deadline.at;
            }
            return callback;
        }
        None
    }

    fn next_deadline(&mut self) -> Option<Millis> {
        while let Some(Reverse(deadline)) = self.heap.peek().copied() {
            let live = matches!(
                self.slots[deadline.index as usize].armed,
                Some((seq, _)) if seq == deadline.seq
            );
            if live {
                return Some(deadline.at);
            }
            self.heap.pop();
        }
        None
    }
}

/// Handle to a shared timer queue.
///
/// Cloning the scheduler clones the handle, not the queue.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tempo_runtime::scheduler::Scheduler;
///
/// let scheduler = Scheduler::new();
/// let fired = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&fired);
/// let clock = scheduler.clock(move || counter.set(counter.get() + 1));
///
/// clock.delay(10.0);
/// scheduler.advance_to(9.0);
/// assert_eq!(fired.get(), 0);
/// scheduler.advance_to(10.0);
/// assert_eq!(fired.get(), 1);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    queue: Rc<RefCell<TimerQueue>>,
    orphans: Orphans,
}

/// Clocks dropped while the queue was borrowed, released on the next access.
type Orphans = Rc<Cell<Vec<(u32, u32)>>>;

impl Scheduler {
    /// Create a scheduler on logical time starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, SchedulerConfig::default().max_fires_per_advance)
    }

    /// Create a scheduler that follows `source` when polled.
    #[must_use]
    pub fn with_source(source: Box<dyn TimeSource>) -> Self {
        Self::build(Some(source), SchedulerConfig::default().max_fires_per_advance)
    }

    /// Create a scheduler from configuration.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let source: Option<Box<dyn TimeSource>> = match config.time_source {
            TimeSourceKind::Logical => None,
            TimeSourceKind::Monotonic => Some(Box::new(MonotonicSource::new())),
        };
        debug!(time_source = ?config.time_source, "Creating scheduler");
        Self::build(source, config.max_fires_per_advance)
    }

    fn build(source: Option<Box<dyn TimeSource>>, max_fires_per_advance: usize) -> Self {
        let now = source.as_ref().map_or(0.0, |s| s.now());
        Self {
            queue: Rc::new(RefCell::new(TimerQueue {
                now,
                slots: Vec::new(),
                free: Vec::new(),
                heap: BinaryHeap::new(),
                next_seq: 0,
                armed: 0,
                fired_total: 0,
                max_fires_per_advance: max_fires_per_advance.max(1),
                source,
            })),
            orphans: Rc::default(),
        }
    }

    /// Release clocks whose drop found the queue borrowed.
    fn settle(&self) {
        let orphans = self.orphans.take();
        if orphans.is_empty() {
            return;
        }
        let released: Vec<Callback> = {
            let mut queue = self.queue.borrow_mut();
            orphans
                .into_iter()
                .filter_map(|(index, generation)| queue.release(index, generation))
                .collect()
        };
        trace!(released = released.len(), "released orphaned clocks");
        drop(released);
    }

    /// Create an unarmed clock that runs `callback` when it fires.
    pub fn clock(&self, callback: impl Fn() + 'static) -> Clock {
        let (index, generation) = self.queue.borrow_mut().alloc(Rc::new(callback));
        Clock {
            queue: Rc::clone(&self.queue),
            orphans: Rc::clone(&self.orphans),
            index,
            generation,
        }
    }

    /// Current logical time.
    #[must_use]
    pub fn now(&self) -> Millis {
        self.queue.borrow().now
    }

    /// Time elapsed since `timestamp`.
    #[must_use]
    pub fn elapsed_since(&self, timestamp: Millis) -> Millis {
        self.now() - timestamp
    }

    /// Absolute time `duration` from now.
    #[must_use]
    pub fn time_after(&self, duration: Millis) -> Millis {
        self.now() + duration
    }

    /// Earliest armed deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Millis> {
        self.settle();
        self.queue.borrow_mut().next_deadline()
    }

    /// Number of clocks currently armed.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.settle();
        self.queue.borrow().armed
    }

    /// Callbacks fired since creation.
    #[must_use]
    pub fn fired_total(&self) -> u64 {
        self.queue.borrow().fired_total
    }

    /// Fire every clock due at or before `target`, then set the time to `target`.
    ///
    /// Time never moves backwards; a `target` in the past only fires what is
    /// already due. The fire limit caps callbacks at a single instant: once
    /// it is reached, the rest due at that instant stay armed for the next
    /// call and time stops there. Returns the number of callbacks fired.
    pub fn advance_to(&self, target: Millis) -> usize {
        let mut fired = 0;
        // Fires since time last moved
        let mut burst = 0;
        loop {
            self.settle();
            let callback = {
                let mut queue = self.queue.borrow_mut();
                let instant = queue.now;
                if burst >= queue.max_fires_per_advance
                    && matches!(queue.next_deadline(), Some(at) if at <= instant)
                {
                    warn!(
                        fired,
                        now = instant,
                        "Fire limit reached, deferring remaining timers"
                    );
                    return fired;
                }
                let callback = queue.pop_due(target);
                if queue.now > instant {
                    burst = 0;
                }
                callback
            };
            let Some(callback) = callback else {
                break;
            };
            trace!(now = self.now(), "timer fired");
            callback();
            fired += 1;
            burst += 1;
        }

        let mut queue = self.queue.borrow_mut();
        if target > queue.now {
            queue.now = target;
        }
        fired
    }

    /// Advance logical time by `duration`.
    pub fn advance_by(&self, duration: Millis) -> usize {
        let target = self.now() + duration.max(0.0);
        self.advance_to(target)
    }

    /// Fire everything already due without moving time.
    pub fn run_due(&self) -> usize {
        self.advance_to(self.now())
    }

    /// Advance to the time source's current reading.
    ///
    /// Without a time source this only fires what is already due.
    pub fn poll(&self) -> usize {
        let target = {
            let queue = self.queue.borrow();
            queue.source.as_ref().map(|source| source.now())
        };
        match target {
            Some(target) => self.advance_to(target),
            None => self.run_due(),
        }
    }

    /// Whether the scheduler follows a time source.
    #[must_use]
    pub fn is_polled(&self) -> bool {
        self.queue.borrow().source.is_some()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("Scheduler")
            .field("now", &queue.now)
            .field("armed", &queue.armed)
            .field("fired_total", &queue.fired_total)
            .finish_non_exhaustive()
    }
}

/// Exclusive membership token in a scheduler's timer queue.
///
/// Dropping the clock cancels any pending arming and frees its slot.
pub struct Clock {
    queue: Rc<RefCell<TimerQueue>>,
    orphans: Orphans,
    index: u32,
    generation: u32,
}

impl Clock {
    /// Arm the clock `after` milliseconds from now, replacing any previous arming.
    ///
    /// Negative or non-finite delays fire at the current time.
    pub fn delay(&self, after: Millis) {
        let after = clamp_delay(after);
        let mut queue = self.queue.borrow_mut();
        let at = queue.now + after;
        queue.arm(self.index, self.generation, at);
    }

    /// Arm the clock at absolute time `at`, replacing any previous arming.
    ///
    /// A time in the past fires at the current time.
    pub fn set_at(&self, at: Millis) {
        let mut queue = self.queue.borrow_mut();
        let at = if at.is_finite() { at } else { queue.now };
        queue.arm(self.index, self.generation, at);
    }

    /// Cancel the pending arming, if any.
    pub fn unset(&self) {
        self.queue.borrow_mut().disarm(self.index, self.generation);
    }

    /// Whether the clock is armed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.deadline().is_some()
    }

    /// Deadline of the pending arming.
    #[must_use]
    pub fn deadline(&self) -> Option<Millis> {
        self.queue
            .borrow()
            .slot(self.index, self.generation)
            .and_then(|slot| slot.armed)
            .map(|(_, at)| at)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        let released = match self.queue.try_borrow_mut() {
            Ok(mut queue) => queue.release(self.index, self.generation),
            Err(_) => {
                // Disarmed once the scheduler next touches the queue
                let mut orphans = self.orphans.take();
                orphans.push((self.index, self.generation));
                self.orphans.set(orphans);
                debug!(index = self.index, "clock dropped while queue borrowed");
                None
            }
        };
        drop(released);
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("deadline", &self.deadline())
            .finish()
    }
}
