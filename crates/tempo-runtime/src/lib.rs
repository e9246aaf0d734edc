//! Cooperative scheduling runtime for the tempo clock objects.
//!
//! - [`scheduler`]: timer queue, cancellable clocks, and time sources
//! - [`outlet`]: output sinks supplied by the host

pub mod outlet;
pub mod scheduler;

pub use outlet::{Discard, Emission, Outlet, OutletRef, Output, Recorder};
pub use scheduler::{Clock, MonotonicSource, Scheduler, TimeSource};
