//! Single-shot delay.
//!
//! [`Delay`] sends one bang a settable time after it is triggered.
//! Triggering again while armed restarts the countdown; stopping cancels it.
//!
//! # Timing Diagram
//!
//! ```text
//! trigger    x           x    x                 stop
//!            |           |    |                  |
//! armed      +-----+     +----+-----+       x----+
//!                  |                |
//! out              *                *
//!            |<-d->|          |<-d->|
//! ```

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use tempo_common::time::{clamp_delay, Millis};
use tempo_runtime::outlet::{Outlet, OutletRef, Output};
use tempo_runtime::scheduler::{Clock, Scheduler};
use tracing::debug;

/// Operations a host can send to a [`Delay`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum DelayCommand {
    /// Arm with the current delay.
    Bang,
    /// Set the delay and arm.
    Float(Millis),
    /// Set the delay without arming.
    SetDelay(Millis),
    /// Cancel.
    Stop,
}

struct DelayState {
    clock: Clock,
    delay: Cell<Millis>,
    outlet: OutletRef,
}

/// Retriggerable single-shot timer.
///
/// # Example
///
/// ```
/// use tempo_objects::delay::Delay;
/// use tempo_runtime::{Recorder, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let out = Recorder::stamped(&scheduler);
/// let delay = Delay::new(&scheduler, 100.0, out.clone());
///
/// delay.trigger();
/// scheduler.advance_to(250.0);
/// assert_eq!(out.times(), vec![100.0]);
/// ```
#[derive(Clone)]
pub struct Delay {
    state: Rc<DelayState>,
}

impl Delay {
    /// Create an unarmed delay of `delay` milliseconds sending to `outlet`.
    pub fn new(scheduler: &Scheduler, delay: Millis, outlet: OutletRef) -> Self {
        let state = Rc::new_cyclic(|weak: &std::rc::Weak<DelayState>| {
            let weak = weak.clone();
            DelayState {
                clock: scheduler.clock(move || {
                    if let Some(state) = weak.upgrade() {
                        state.outlet.send(&Output::Bang);
                    }
                }),
                delay: Cell::new(clamp_delay(delay)),
                outlet,
            }
        });
        Self { state }
    }

    /// Set the delay; negative or non-finite values become 0.
    pub fn set_delay(&self, delay: Millis) {
        self.state.delay.set(clamp_delay(delay));
    }

    /// Arm for the current delay from now, replacing any pending arming.
    pub fn trigger(&self) {
        let delay = self.state.delay.get();
        debug!(delay, "delay armed");
        self.state.clock.delay(delay);
    }

    /// Set the delay, then arm.
    pub fn trigger_with_value(&self, delay: Millis) {
        self.set_delay(delay);
        self.trigger();
    }

    /// Cancel a pending arming; does nothing when idle.
    pub fn stop(&self) {
        self.state.clock.unset();
    }

    /// Apply a host command.
    pub fn apply(&self, command: DelayCommand) {
        match command {
            DelayCommand::Bang => self.trigger(),
            DelayCommand::Float(delay) => self.trigger_with_value(delay),
            DelayCommand::SetDelay(delay) => self.set_delay(delay),
            DelayCommand::Stop => self.stop(),
        }
    }

    /// Current delay.
    #[must_use]
    pub fn delay(&self) -> Millis {
        self.state.delay.get()
    }

    /// Whether a bang is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.clock.is_set()
    }

    /// Time the pending bang is due.
    #[must_use]
    pub fn deadline(&self) -> Option<Millis> {
        self.state.clock.deadline()
    }
}

impl std::fmt::Debug for Delay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delay")
            .field("delay", &self.delay())
            .field("deadline", &self.deadline())
            .finish()
    }
}
