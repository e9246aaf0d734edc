//! Output sinks supplied by the host.
//!
//! Every object receives its outlets at construction and only ever sends the
//! type declared for that outlet. Any `Fn(&Output)` closure is an outlet; the
//! [`Recorder`] keeps everything it receives, stamped with scheduler time.

use crate::scheduler::Scheduler;
use std::cell::RefCell;
use std::rc::Rc;
use tempo_common::binding::ExternalBinding;
use tempo_common::time::Millis;
use tempo_common::value::Symbol;

/// A single emitted message.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Notification without payload.
    Bang,
    /// Numeric value.
    Float(f64),
    /// Symbol value.
    Symbol(Symbol),
    /// Live reference to host state.
    Reference(ExternalBinding),
}

/// Host-provided sink for one object output.
pub trait Outlet {
    /// Deliver `output`.
    ///
    /// The emitting object holds no internal borrow while this runs, so the
    /// implementation may call back into it.
    fn send(&self, output: &Output);
}

impl<F> Outlet for F
where
    F: Fn(&Output),
{
    fn send(&self, output: &Output) {
        self(output);
    }
}

/// Shared handle to an outlet.
pub type OutletRef = Rc<dyn Outlet>;

/// Outlet that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl Outlet for Discard {
    fn send(&self, _output: &Output) {}
}

/// An output together with the logical time it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Scheduler time at emission, or 0 for an unstamped recorder.
    pub at: Millis,
    /// What was emitted.
    pub output: Output,
}

/// Outlet that records every emission.
#[derive(Debug, Default)]
pub struct Recorder {
    scheduler: Option<Scheduler>,
    emissions: RefCell<Vec<Emission>>,
}

impl Recorder {
    /// Recorder without timestamps.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Recorder stamping each emission with `scheduler`'s current time.
    #[must_use]
    pub fn stamped(scheduler: &Scheduler) -> Rc<Self> {
        Rc::new(Self {
            scheduler: Some(scheduler.clone()),
            emissions: RefCell::new(Vec::new()),
        })
    }

    /// All emissions so far.
    #[must_use]
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.borrow().clone()
    }

    /// All outputs so far, without timestamps.
    #[must_use]
    pub fn outputs(&self) -> Vec<Output> {
        self.emissions
            .borrow()
            .iter()
            .map(|e| e.output.clone())
            .collect()
    }

    /// Numeric outputs only.
    #[must_use]
    pub fn floats(&self) -> Vec<f64> {
        self.emissions
            .borrow()
            .iter()
            .filter_map(|e| match e.output {
                Output::Float(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Timestamps of every emission.
    #[must_use]
    pub fn times(&self) -> Vec<Millis> {
        self.emissions.borrow().iter().map(|e| e.at).collect()
    }

    /// Number of emissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emissions.borrow().len()
    }

    /// Whether nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emissions.borrow().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.emissions.borrow_mut().clear();
    }
}

impl Outlet for Recorder {
    fn send(&self, output: &Output) {
        let at = self.scheduler.as_ref().map_or(0.0, Scheduler::now);
        self.emissions.borrow_mut().push(Emission {
            at,
            output: output.clone(),
        });
    }
}
