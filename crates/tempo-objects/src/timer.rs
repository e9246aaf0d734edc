//! Elapsed-time probe.
//!
//! [`Timer`] remembers the time it was last marked and reports the time
//! elapsed since then on every query. Querying does not reset the mark.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tempo_common::time::Millis;
use tempo_runtime::outlet::{Outlet, OutletRef, Output};
use tempo_runtime::scheduler::Scheduler;

/// Operations a host can send to a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimerCommand {
    /// Reset the reference time to now.
    Mark,
    /// Emit the time since the reference.
    Query,
}

/// Stopwatch over scheduler time.
///
/// # Example
///
/// ```
/// use tempo_objects::timer::Timer;
/// use tempo_runtime::{Recorder, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let out = Recorder::new();
/// let timer = Timer::new(&scheduler, out.clone());
///
/// scheduler.advance_to(42.0);
/// assert_eq!(timer.query(), 42.0);
/// assert_eq!(out.floats(), vec![42.0]);
/// ```
pub struct Timer {
    scheduler: Scheduler,
    reference: Cell<Millis>,
    outlet: OutletRef,
}

impl Timer {
    /// Create a timer marked at the current time.
    pub fn new(scheduler: &Scheduler, outlet: OutletRef) -> Self {
        let timer = Self {
            scheduler: scheduler.clone(),
            reference: Cell::new(0.0),
            outlet,
        };
        timer.mark();
        timer
    }

    /// Store the current time as the reference.
    pub fn mark(&self) {
        self.reference.set(self.scheduler.now());
    }

    /// Time elapsed since the reference, without emitting.
    #[must_use]
    pub fn elapsed(&self) -> Millis {
        self.scheduler.elapsed_since(self.reference.get())
    }

    /// Emit and return the time elapsed since the reference.
    pub fn query(&self) -> Millis {
        let elapsed = self.elapsed();
        self.outlet.send(&Output::Float(elapsed));
        elapsed
    }

    /// Apply a host command.
    pub fn apply(&self, command: TimerCommand) {
        match command {
            TimerCommand::Mark => self.mark(),
            TimerCommand::Query => {
                self.query();
            }
        }
    }

    /// The reference time.
    #[must_use]
    pub fn reference(&self) -> Millis {
        self.reference.get()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("reference", &self.reference.get())
            .finish_non_exhaustive()
    }
}
