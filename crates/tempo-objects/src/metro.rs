//! Periodic retrigger.
//!
//! [`Metro`] bangs immediately when started and then once per interval until
//! stopped. The outlet handler may stop, restart, or retune the metro while
//! it is being notified; a guard flag set by those calls keeps the tick that
//! is in progress from re-arming on top of them.
//!
//! # Timing Diagram
//!
//! ```text
//! start   x                          stop
//!         |                           |
//! out     *      *      *      *      |
//!         |<-d-->|<-d-->|<-d-->|
//! ```

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use tempo_common::time::{clamp_interval, Millis};
use tempo_runtime::outlet::{Outlet, OutletRef, Output};
use tempo_runtime::scheduler::{Clock, Scheduler};
use tracing::{debug, trace};

/// Operations a host can send to a [`Metro`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum MetroCommand {
    /// Start: bang now and keep going.
    Bang,
    /// Nonzero starts, zero stops.
    Float(f64),
    /// Change the interval for the next re-arm.
    SetInterval(Millis),
    /// Stop.
    Stop,
}

struct MetroState {
    clock: Clock,
    interval: Cell<Millis>,
    /// Set by start/stop; cleared at the top of every tick.
    hit: Cell<bool>,
    outlet: OutletRef,
}

impl MetroState {
    fn tick(&self) {
        self.hit.set(false);
        trace!(interval = self.interval.get(), "metro tick");
        self.outlet.send(&Output::Bang);
        if !self.hit.get() {
            self.clock.delay(self.interval.get());
        }
    }
}

/// Self re-arming periodic timer.
///
/// # Example
///
/// ```
/// use tempo_objects::metro::Metro;
/// use tempo_runtime::{Recorder, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let out = Recorder::stamped(&scheduler);
/// let metro = Metro::new(&scheduler, 100.0, out.clone());
///
/// metro.start();
/// scheduler.advance_to(350.0);
/// assert_eq!(out.times(), vec![0.0, 100.0, 200.0, 300.0]);
/// ```
#[derive(Clone)]
pub struct Metro {
    state: Rc<MetroState>,
}

impl Metro {
    /// Create a stopped metro with the given interval.
    pub fn new(scheduler: &Scheduler, interval: Millis, outlet: OutletRef) -> Self {
        let state = Rc::new_cyclic(|weak: &std::rc::Weak<MetroState>| {
            let weak = weak.clone();
            MetroState {
                clock: scheduler.clock(move || {
                    if let Some(state) = weak.upgrade() {
                        state.tick();
                    }
                }),
                interval: Cell::new(clamp_interval(interval)),
                hit: Cell::new(false),
                outlet,
            }
        });
        Self { state }
    }

    /// Set the interval; values below 1 (or non-finite) become 1.
    ///
    /// Takes effect at the next re-arm.
    pub fn set_interval(&self, interval: Millis) {
        self.state.interval.set(clamp_interval(interval));
    }

    /// Emit one bang and re-arm unless the handler started or stopped the
    /// metro during the bang.
    pub fn tick(&self) {
        self.state.tick();
    }

    /// Nonzero: tick now (which arms periodic firing). Zero: cancel.
    pub fn trigger_with_value(&self, value: f64) {
        if value == 0.0 {
            debug!("metro stopped");
            self.state.clock.unset();
        } else {
            self.state.tick();
        }
        self.state.hit.set(true);
    }

    /// Start: equivalent to a nonzero value.
    pub fn start(&self) {
        self.trigger_with_value(1.0);
    }

    /// Stop: equivalent to zero.
    pub fn stop(&self) {
        self.trigger_with_value(0.0);
    }

    /// Apply a host command.
    pub fn apply(&self, command: MetroCommand) {
        match command {
            MetroCommand::Bang => self.start(),
            MetroCommand::Float(value) => self.trigger_with_value(value),
            MetroCommand::SetInterval(interval) => self.set_interval(interval),
            MetroCommand::Stop => self.stop(),
        }
    }

    /// Current interval.
    #[must_use]
    pub fn interval(&self) -> Millis {
        self.state.interval.get()
    }

    /// Whether the next tick is armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.clock.is_set()
    }
}

impl std::fmt::Debug for Metro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metro")
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .finish()
    }
}
