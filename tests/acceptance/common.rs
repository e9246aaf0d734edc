//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - Building a logical scheduler with stamped recorders
//! - Wiring objects whose outlets call back into other objects
//! - Checking ramp output shapes

#![allow(dead_code)] // Not every scenario uses every helper

use std::cell::OnceCell;
use std::rc::Rc;
use tempo_runtime::{Outlet, OutletRef, Output, Recorder, Scheduler};

/// Logical scheduler plus `n` recorders stamped with its time.
pub fn rig(n: usize) -> (Scheduler, Vec<Rc<Recorder>>) {
    let scheduler = Scheduler::new();
    let recorders = (0..n).map(|_| Recorder::stamped(&scheduler)).collect();
    (scheduler, recorders)
}

/// Recorders as outlet handles.
pub fn outlets(recorders: &[Rc<Recorder>]) -> Vec<OutletRef> {
    recorders
        .iter()
        .map(|recorder| Rc::clone(recorder) as OutletRef)
        .collect()
}

/// Late-bound handle to an object created after the outlet that needs it.
pub type Slot<T> = Rc<OnceCell<T>>;

/// Outlet that records into `sink` and then runs `react` with the object
/// stored in the returned slot, if any.
pub fn reacting<T: 'static>(
    sink: &Rc<Recorder>,
    react: impl Fn(&T, &Output) + 'static,
) -> (OutletRef, Slot<T>) {
    let slot: Slot<T> = Rc::new(OnceCell::new());
    let handle = Rc::clone(&slot);
    let sink = Rc::clone(sink);
    let outlet: OutletRef = Rc::new(move |output: &Output| {
        sink.send(output);
        if let Some(object) = handle.get() {
            react(object, output);
        }
    });
    (outlet, slot)
}

/// Whether `values` never decreases.
pub fn non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}

/// Whether `values` never increases.
pub fn non_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] >= pair[1])
}

/// Whether `a` and `b` agree within `tolerance`.
pub fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
