//! Linear ramp generator.
//!
//! [`Line`] glides from its current value to a target over a staged duration,
//! emitting the interpolated value every `grain` milliseconds and the exact
//! target at the end. Without a staged duration it jumps straight to the target.
//!
//! # Timing Diagram
//!
//! ```text
//! set_next_duration(d)  ramp_to(t)
//!                           |
//! value   start ------------*                        ________ t
//!                           |  *    *    *    *  *  /
//!                           |<-g->|<-g->|       |<-r->|
//!                           |<---------- d ---------->|
//! ```
//!
//! The final poll is shortened to the remaining time `r`, so the target lands
//! exactly at `start_time + d`.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use tempo_common::time::{clamp_grain, Millis, DEFAULT_GRAIN, RAMP_EPSILON};
use tempo_runtime::outlet::{Outlet, OutletRef, Output};
use tempo_runtime::scheduler::{Clock, Scheduler};
use tracing::{debug, trace};

/// Operations a host can send to a [`Line`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum LineCommand {
    /// Ramp (or jump) to a target.
    Float(f64),
    /// Stage the duration of the next ramp.
    SetDuration(Millis),
    /// Change the polling granularity.
    SetGrain(Millis),
    /// Jump to a value without output.
    Set(f64),
    /// Freeze at the last output.
    Stop,
}

struct LineState {
    scheduler: Scheduler,
    clock: Clock,
    outlet: OutletRef,
    /// Value at the start of the current segment.
    start_value: Cell<f64>,
    target_value: Cell<f64>,
    start_time: Cell<Millis>,
    target_time: Cell<Millis>,
    /// `1 / (target_time - start_time)`.
    slope: Cell<f64>,
    grain: Cell<Millis>,
    staged: Cell<Option<Millis>>,
    last: Cell<f64>,
}

impl LineState {
    /// Value of the current segment at `now`, holding the target once reached.
    fn value_at(&self, now: Millis) -> f64 {
        if now > self.target_time.get() {
            self.target_value.get()
        } else {
            let start = self.start_value.get();
            start
                + self.slope.get()
                    * (now - self.start_time.get())
                    * (self.target_value.get() - start)
        }
    }

    fn emit(&self, value: f64) {
        self.last.set(value);
        self.outlet.send(&Output::Float(value));
    }

    fn poll_tick(&self) {
        let now = self.scheduler.now();
        let remaining = self.target_time.get() - now;
        if remaining < RAMP_EPSILON {
            trace!(target = self.target_value.get(), "ramp finished");
            self.emit(self.target_value.get());
        } else {
            let value = self.value_at(now);
            self.clock.delay(self.grain.get().min(remaining));
            self.emit(value);
        }
    }

    fn ramp_to(&self, target: f64) {
        let now = self.scheduler.now();
        match self.staged.take() {
            Some(duration) if duration > 0.0 && duration.is_finite() => {
                let start = self.value_at(now);
                self.start_value.set(start);
                self.start_time.set(now);
                self.target_time.set(now + duration);
                self.target_value.set(target);
                self.slope.set(1.0 / duration);
                debug!(start, target, duration, "ramp started");
                self.clock.delay(self.grain.get().min(duration));
                self.emit(start);
            }
            _ => {
                self.clock.unset();
                self.jump(target, now);
                self.emit(target);
            }
        }
    }

    fn jump(&self, value: f64, now: Millis) {
        self.start_value.set(value);
        self.target_value.set(value);
        self.start_time.set(now);
        self.target_time.set(now);
    }
}

/// Time-interpolated ramp.
///
/// # Example
///
/// ```
/// use tempo_objects::line::Line;
/// use tempo_runtime::{Recorder, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let out = Recorder::new();
/// let line = Line::new(&scheduler, 0.0, 25.0, out.clone());
///
/// line.set_next_duration(100.0);
/// line.ramp_to(1.0);
/// scheduler.advance_to(100.0);
/// assert_eq!(out.floats(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
/// ```
#[derive(Clone)]
pub struct Line {
    state: Rc<LineState>,
}

impl Line {
    /// Create a line resting at `initial` that polls every `grain` milliseconds.
    ///
    /// A non-positive `grain` selects the default of 20.
    pub fn new(scheduler: &Scheduler, initial: f64, grain: Millis, outlet: OutletRef) -> Self {
        let now = scheduler.now();
        let state = Rc::new_cyclic(|weak: &std::rc::Weak<LineState>| {
            let weak = weak.clone();
            LineState {
                scheduler: scheduler.clone(),
                clock: scheduler.clock(move || {
                    if let Some(state) = weak.upgrade() {
                        state.poll_tick();
                    }
                }),
                outlet,
                start_value: Cell::new(initial),
                target_value: Cell::new(initial),
                start_time: Cell::new(now),
                target_time: Cell::new(now),
                slope: Cell::new(1.0),
                grain: Cell::new(clamp_grain(grain, DEFAULT_GRAIN)),
                staged: Cell::new(None),
                last: Cell::new(initial),
            }
        });
        Self { state }
    }

    /// Stage the duration used by the next [`ramp_to`](Self::ramp_to).
    pub fn set_next_duration(&self, duration: Millis) {
        self.state.staged.set(Some(duration));
    }

    /// Ramp to `target` over the staged duration, or jump when none is staged.
    ///
    /// The staged duration is consumed either way.
    pub fn ramp_to(&self, target: f64) {
        self.state.ramp_to(target);
    }

    /// Emit the value for now and re-arm, or emit the target when done.
    pub fn poll_tick(&self) {
        self.state.poll_tick();
    }

    /// Freeze at the last emitted value and cancel polling.
    pub fn stop(&self) {
        let state = &self.state;
        state.clock.unset();
        state.jump(state.last.get(), state.scheduler.now());
    }

    /// Jump to `value` without emitting, cancelling any ramp.
    pub fn set(&self, value: f64) {
        let state = &self.state;
        state.clock.unset();
        state.jump(value, state.scheduler.now());
        state.last.set(value);
    }

    /// Change the polling granularity; non-positive values select the default.
    pub fn set_grain(&self, grain: Millis) {
        self.state.grain.set(clamp_grain(grain, DEFAULT_GRAIN));
    }

    /// Apply a host command.
    pub fn apply(&self, command: LineCommand) {
        match command {
            LineCommand::Float(target) => self.ramp_to(target),
            LineCommand::SetDuration(duration) => self.set_next_duration(duration),
            LineCommand::SetGrain(grain) => self.set_grain(grain),
            LineCommand::Set(value) => self.set(value),
            LineCommand::Stop => self.stop(),
        }
    }

    /// Last emitted value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.state.last.get()
    }

    /// Target of the current (or last) segment.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.state.target_value.get()
    }

    /// Polling granularity.
    #[must_use]
    pub fn grain(&self) -> Millis {
        self.state.grain.get()
    }

    /// Whether a ramp is in progress.
    #[must_use]
    pub fn is_ramping(&self) -> bool {
        self.state.clock.is_set()
    }
}

impl std::fmt::Debug for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("value", &self.value())
            .field("target", &self.target())
            .field("grain", &self.grain())
            .field("ramping", &self.is_ramping())
            .finish()
    }
}
