//! Bounded record of recoverable conditions.
//!
//! Objects push every [`TempoError`] they recover from into a ring buffer so
//! the host can inspect them later. The buffer is allocated once; when full,
//! the oldest entry is overwritten and counted as dropped.

use crate::error::TempoError;
use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::warn;

/// Default number of conditions retained per object.
pub const DEFAULT_CONDITION_CAPACITY: usize = 64;

#[derive(Debug)]
struct Ring {
    entries: VecDeque<TempoError>,
    capacity: usize,
    total: u64,
    dropped: u64,
}

/// Ring buffer of recovered conditions with interior mutability.
///
/// Recording takes `&self` so objects can report from inside callbacks.
#[derive(Debug)]
pub struct ConditionLog {
    ring: RefCell<Ring>,
}

impl ConditionLog {
    /// Create a log retaining at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: RefCell::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                total: 0,
                dropped: 0,
            }),
        }
    }

    /// Log `condition` at warn level and retain it.
    pub fn report(&self, object: &str, condition: TempoError) {
        warn!(object, %condition, "recovered condition");
        self.record(condition);
    }

    /// Retain `condition` without logging.
    pub fn record(&self, condition: TempoError) {
        let mut ring = self.ring.borrow_mut();
        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
            ring.dropped += 1;
        }
        ring.entries.push_back(condition);
        ring.total += 1;
    }

    /// Remove and return all retained conditions, oldest first.
    pub fn drain(&self) -> Vec<TempoError> {
        self.ring.borrow_mut().entries.drain(..).collect()
    }

    /// Copy of the retained conditions, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TempoError> {
        self.ring.borrow().entries.iter().cloned().collect()
    }

    /// Number of retained conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.borrow().entries.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.borrow().entries.is_empty()
    }

    /// Conditions recorded since creation.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.ring.borrow().total
    }

    /// Conditions overwritten because the ring was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.ring.borrow().dropped
    }
}

impl Default for ConditionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CONDITION_CAPACITY)
    }
}
