//! Time-scheduled message objects.
//!
//! Every object runs on a shared [`Scheduler`](tempo_runtime::Scheduler) and
//! emits through host-supplied outlets:
//!
//! - **Delay** ([`delay`]): one bang a settable time after a trigger
//! - **Metro** ([`metro`]): periodic bangs until stopped
//! - **Line** ([`line`]): linear ramp sampled at a fixed grain
//! - **Timer** ([`timer`]): elapsed time since a mark
//! - **Pipe** ([`pipe`]): delayed delivery of typed value tuples
//!
//! # Example
//!
//! ```
//! use tempo_objects::{Delay, Line, Metro};
//! use tempo_runtime::{Recorder, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let bangs = Recorder::stamped(&scheduler);
//! let ramp = Recorder::stamped(&scheduler);
//!
//! let delay = Delay::new(&scheduler, 100.0, bangs.clone());
//! let metro = Metro::new(&scheduler, 40.0, bangs.clone());
//! let line = Line::new(&scheduler, 0.0, 20.0, ramp.clone());
//!
//! delay.trigger();
//! metro.start();
//! line.set_next_duration(100.0);
//! line.ramp_to(1.0);
//!
//! scheduler.advance_to(100.0);
//! metro.stop();
//! assert_eq!(bangs.times(), vec![0.0, 40.0, 80.0, 100.0]);
//! assert_eq!(ramp.floats().last(), Some(&1.0));
//! ```

pub mod delay;
pub mod line;
pub mod metro;
pub mod pending;
pub mod pipe;
pub mod timer;

pub use delay::{Delay, DelayCommand};
pub use line::{Line, LineCommand};
pub use metro::{Metro, MetroCommand};
pub use pending::{DeliveryId, PendingList};
pub use pipe::{Pipe, PipeCommand, PipeLayout, SlotValue};
pub use timer::{Timer, TimerCommand};
