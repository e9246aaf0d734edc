//! Multi-value delayed queue.
//!
//! A [`Pipe`] holds a fixed number of typed slots (number, symbol, or
//! reference) and a delay. Every [`enqueue`](Pipe::enqueue) writes the given
//! values into the live slots, snapshots all slots, and schedules the snapshot
//! for delivery after the current delay. Any number of deliveries can be in
//! flight at once; each keeps the values it was enqueued with.
//!
//! # Delivery
//!
//! When a delivery fires, its values go out through one outlet per slot,
//! rightmost slot first, so the leftmost outlet always fires last. Reference
//! values are only sent while the binding is still live; a stale reference is
//! reported and skipped, and the remaining slots are still delivered.
//!
//! # Reference counting
//!
//! A live reference slot holds one binding copy and every pending delivery
//! holds its own. Copies are released when a slot is overwritten, when a
//! delivery is dispatched or discarded, and when the pipe is dropped.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tempo_common::value::TaggedValue;
//! use tempo_objects::pipe::{Pipe, PipeLayout};
//! use tempo_runtime::{Output, Recorder, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let (layout, conditions) = PipeLayout::parse(&[TaggedValue::from("f"), TaggedValue::from(50.0)]);
//! assert!(conditions.is_empty());
//!
//! let out = Recorder::stamped(&scheduler);
//! let pipe = Pipe::new(&scheduler, layout, vec![out.clone()]);
//!
//! pipe.enqueue(&[TaggedValue::from(3.0)]);
//! scheduler.advance_to(100.0);
//! assert_eq!(out.outputs(), vec![Output::Float(3.0)]);
//! assert_eq!(out.times(), vec![50.0]);
//! ```

use crate::pending::{DeliveryId, PendingList};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tempo_common::binding::ExternalBinding;
use tempo_common::conditions::ConditionLog;
use tempo_common::error::{TempoError, TempoResult};
use tempo_common::time::Millis;
use tempo_common::value::{SlotKind, Symbol, TaggedValue};
use tempo_runtime::outlet::{Discard, Outlet, OutletRef, Output};
use tempo_runtime::scheduler::{Clock, Scheduler};
use tracing::{debug, trace, warn};

/// Value held by a pipe slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// Number slot.
    Number(f64),
    /// Symbol slot.
    Symbol(Symbol),
    /// Reference slot; `None` until a valid reference arrives.
    Reference(Option<ExternalBinding>),
}

impl SlotValue {
    /// Declared kind of the slot.
    #[must_use]
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Number(_) => SlotKind::Number,
            Self::Symbol(_) => SlotKind::Symbol,
            Self::Reference(_) => SlotKind::Reference,
        }
    }

    /// Fresh slot of `kind` with its default value.
    #[must_use]
    pub fn empty(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Number => Self::Number(0.0),
            SlotKind::Symbol => Self::Symbol(Symbol::placeholder()),
            SlotKind::Reference => Self::Reference(None),
        }
    }
}

/// Slot declarations and initial delay of a pipe.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeLayout {
    slots: Vec<SlotValue>,
    delay: Millis,
}

impl PipeLayout {
    /// Layout from explicit slot kinds.
    ///
    /// An empty `kinds` declares a single number slot.
    #[must_use]
    pub fn new(kinds: &[SlotKind], delay: Millis) -> Self {
        let slots = if kinds.is_empty() {
            vec![SlotValue::Number(0.0)]
        } else {
            kinds.iter().map(|&kind| SlotValue::empty(kind)).collect()
        };
        Self { slots, delay }
    }

    /// Decode creation arguments.
    ///
    /// The trailing argument is the delay. Each remaining argument declares a
    /// slot: a number declares a number slot holding that value, a symbol
    /// declares a slot by its first character (`f`, `s`, `p`). Problems are
    /// returned alongside the layout and never abort the parse:
    ///
    /// - a non-numeric delay is reported and the delay becomes 0
    /// - an unknown descriptor is reported and the slot becomes a number
    #[must_use]
    pub fn parse(args: &[TaggedValue]) -> (Self, Vec<TempoError>) {
        let mut conditions = Vec::new();
        let (delay, declarations) = match args.split_last() {
            Some((TaggedValue::Number(delay), rest)) => (*delay, rest),
            Some((other, rest)) => {
                conditions.push(TempoError::BadDelayArgument {
                    argument: other.to_string(),
                });
                (0.0, rest)
            }
            None => (0.0, args),
        };

        let mut slots: Vec<SlotValue> = declarations
            .iter()
            .enumerate()
            .map(|(slot, arg)| match arg {
                TaggedValue::Number(value) => SlotValue::Number(*value),
                TaggedValue::Symbol(descriptor) => {
                    match SlotKind::from_descriptor(&descriptor.name()) {
                        Some(kind) => SlotValue::empty(kind),
                        None => {
                            conditions.push(TempoError::UnsupportedTypeTag {
                                slot,
                                tag: descriptor.to_string(),
                            });
                            SlotValue::Number(0.0)
                        }
                    }
                }
                TaggedValue::Reference(binding) => {
                    conditions.push(TempoError::UnsupportedTypeTag {
                        slot,
                        tag: binding.to_string(),
                    });
                    SlotValue::Number(0.0)
                }
            })
            .collect();
        if slots.is_empty() {
            slots.push(SlotValue::Number(0.0));
        }

        (Self { slots, delay }, conditions)
    }

    /// Number of slots.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Declared kinds in slot order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SlotKind> {
        self.slots.iter().map(SlotValue::kind).collect()
    }

    /// Initial delay.
    #[must_use]
    pub fn delay(&self) -> Millis {
        self.delay
    }
}

/// Operations a host can send to a [`Pipe`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipeCommand {
    /// Enqueue a list of values.
    List(Vec<TaggedValue>),
    /// Overwrite one slot; the index equal to the arity addresses the delay.
    SetSlot {
        /// Slot index.
        index: usize,
        /// New value.
        value: TaggedValue,
    },
    /// Change the delay for future enqueues.
    SetDelay(Millis),
    /// Deliver everything pending now.
    Flush,
    /// Discard everything pending.
    Clear,
}

struct PendingDelivery {
    clock: Clock,
    values: Vec<SlotValue>,
}

struct PipeState {
    scheduler: Scheduler,
    this: Weak<PipeState>,
    slots: RefCell<Vec<SlotValue>>,
    outlets: Vec<OutletRef>,
    delay: Cell<Millis>,
    reference_slots: usize,
    pending: RefCell<PendingList<PendingDelivery>>,
    conditions: ConditionLog,
}

impl PipeState {
    fn report(&self, condition: TempoError) {
        self.conditions.report("pipe", condition);
    }

    fn dispatch(&self, id: DeliveryId) -> bool {
        let delivery = self.pending.borrow_mut().remove(id);
        match delivery {
            Some(delivery) => {
                trace!(?id, "delivery fired");
                delivery.clock.unset();
                self.deliver(delivery);
                true
            }
            None => false,
        }
    }

    /// Emit a delivery that has already been unlinked, then release it.
    fn deliver(&self, delivery: PendingDelivery) {
        for (slot, value) in delivery.values.iter().enumerate().rev() {
            let outlet = &self.outlets[slot];
            match value {
                SlotValue::Number(v) => outlet.send(&Output::Float(*v)),
                SlotValue::Symbol(s) => outlet.send(&Output::Symbol(*s)),
                SlotValue::Reference(Some(binding)) if binding.is_live() => {
                    outlet.send(&Output::Reference(binding.clone()));
                }
                SlotValue::Reference(_) => self.report(TempoError::StaleReference { slot }),
            }
        }
    }
}

impl Drop for PipeState {
    fn drop(&mut self) {
        let pending = self.pending.get_mut();
        if !pending.is_empty() {
            debug!(pending = pending.len(), "pipe dropped, discarding deliveries");
        }
        // Dropping each clock cancels its arming
        while pending.pop_front().is_some() {}
    }
}

/// Delayed queue of typed value tuples.
#[derive(Clone)]
pub struct Pipe {
    state: Rc<PipeState>,
}

impl Pipe {
    /// Create a pipe with one outlet per slot.
    ///
    /// Missing outlets are replaced by [`Discard`]; extra outlets are ignored.
    pub fn new(scheduler: &Scheduler, layout: PipeLayout, outlets: Vec<OutletRef>) -> Self {
        Self::with_conditions(scheduler, layout, outlets, ConditionLog::default())
    }

    /// Create a pipe recording its conditions into `conditions`.
    pub fn with_conditions(
        scheduler: &Scheduler,
        layout: PipeLayout,
        mut outlets: Vec<OutletRef>,
        conditions: ConditionLog,
    ) -> Self {
        let arity = layout.arity();
        if outlets.len() != arity {
            warn!(arity, outlets = outlets.len(), "pipe outlet count mismatch");
        }
        outlets.resize_with(arity, || Rc::new(Discard));

        let reference_slots = layout
            .slots
            .iter()
            .filter(|slot| slot.kind() == SlotKind::Reference)
            .count();
        let state = Rc::new_cyclic(|this| PipeState {
            scheduler: scheduler.clone(),
            this: this.clone(),
            slots: RefCell::new(layout.slots),
            outlets,
            delay: Cell::new(layout.delay),
            reference_slots,
            pending: RefCell::new(PendingList::new()),
            conditions,
        });
        Self { state }
    }

    /// Parse creation arguments and build the pipe.
    ///
    /// Parse problems are recorded in the pipe's condition log.
    pub fn from_args(scheduler: &Scheduler, args: &[TaggedValue], outlets: Vec<OutletRef>) -> Self {
        let (layout, conditions) = PipeLayout::parse(args);
        let pipe = Self::new(scheduler, layout, outlets);
        for condition in conditions {
            pipe.state.report(condition);
        }
        pipe
    }

    /// Overwrite live slot `index` without enqueuing.
    ///
    /// Pending deliveries are unaffected. The index equal to the arity
    /// addresses the delay.
    ///
    /// # Errors
    ///
    /// [`TempoError::SlotOutOfRange`] for an index past the delay slot and
    /// [`TempoError::SlotTypeMismatch`] when `value` does not match the
    /// declared kind. The slot is left unchanged in both cases.
    pub fn set_slot(&self, index: usize, value: TaggedValue) -> TempoResult<()> {
        let arity = self.arity();
        if index == arity {
            return match value {
                TaggedValue::Number(delay) => {
                    self.set_delay(delay);
                    Ok(())
                }
                other => Err(TempoError::SlotTypeMismatch {
                    index,
                    expected: SlotKind::Number,
                    found: other.kind(),
                }),
            };
        }

        let mut slots = self.state.slots.borrow_mut();
        let slot = slots
            .get_mut(index)
            .ok_or(TempoError::SlotOutOfRange { index, arity })?;
        match (slot, value) {
            (SlotValue::Number(current), TaggedValue::Number(v)) => *current = v,
            (SlotValue::Symbol(current), TaggedValue::Symbol(s)) => *current = s,
            (SlotValue::Reference(current), TaggedValue::Reference(binding)) => {
                *current = Some(binding);
            }
            (slot, value) => {
                return Err(TempoError::SlotTypeMismatch {
                    index,
                    expected: slot.kind(),
                    found: value.kind(),
                })
            }
        }
        Ok(())
    }

    /// Change the delay used by future enqueues.
    ///
    /// Stored as given; negative or non-finite delays schedule at 0.
    pub fn set_delay(&self, delay: Millis) {
        self.state.delay.set(delay);
    }

    /// Write `values` into the slots, snapshot them and schedule the snapshot.
    ///
    /// Values are matched to slots by position. Extra values are ignored and
    /// missing trailing values keep the current slot contents. A number slot
    /// reads a non-number as 0 and a symbol slot reads a non-symbol as the
    /// placeholder symbol; a reference slot given anything but a reference is
    /// reported and left empty.
    pub fn enqueue(&self, values: &[TaggedValue]) -> DeliveryId {
        let state = &*self.state;
        let mut bad_references = Vec::new();
        let snapshot = {
            let mut slots = state.slots.borrow_mut();
            for (index, (slot, value)) in slots.iter_mut().zip(values).enumerate() {
                match slot {
                    SlotValue::Number(current) => *current = value.as_number(),
                    SlotValue::Symbol(current) => *current = value.as_symbol(),
                    SlotValue::Reference(current) => match value.as_reference() {
                        Some(binding) => *current = Some(binding.clone()),
                        None => {
                            *current = None;
                            bad_references.push(index);
                        }
                    },
                }
            }
            let mut snapshot = Vec::with_capacity(slots.len());
            snapshot.extend(slots.iter().cloned());
            snapshot
        };
        for slot in bad_references {
            state.report(TempoError::BadReferenceValue { slot });
        }

        let delay = state.delay.get();
        let this = state.this.clone();
        let id = state.pending.borrow_mut().push_front_with(|id| {
            let clock = state.scheduler.clock(move || {
                if let Some(state) = this.upgrade() {
                    state.dispatch(id);
                }
            });
            clock.delay(delay);
            PendingDelivery {
                clock,
                values: snapshot,
            }
        });
        debug!(?id, delay, pending = self.pending_len(), "delivery enqueued");
        id
    }

    /// Deliver one pending entry now, ahead of its timer.
    ///
    /// Returns `false` when `id` is no longer pending.
    pub fn dispatch(&self, id: DeliveryId) -> bool {
        self.state.dispatch(id)
    }

    /// Deliver every pending entry now, newest first.
    ///
    /// Entries enqueued by an outlet handler during the flush are delivered
    /// by the same flush.
    pub fn flush(&self) {
        let mut delivered = 0_usize;
        loop {
            let head = self.state.pending.borrow_mut().pop_front();
            let Some((_, delivery)) = head else {
                break;
            };
            delivery.clock.unset();
            self.state.deliver(delivery);
            delivered += 1;
        }
        debug!(delivered, "pipe flushed");
    }

    /// Discard every pending entry without output.
    pub fn clear(&self) {
        let mut discarded = 0_usize;
        loop {
            let head = self.state.pending.borrow_mut().pop_front();
            let Some((_, delivery)) = head else {
                break;
            };
            delivery.clock.unset();
            drop(delivery);
            discarded += 1;
        }
        debug!(discarded, "pipe cleared");
    }

    /// Apply a host command.
    ///
    /// # Errors
    ///
    /// Propagates [`set_slot`](Self::set_slot) errors.
    pub fn apply(&self, command: PipeCommand) -> TempoResult<()> {
        match command {
            PipeCommand::List(values) => {
                self.enqueue(&values);
            }
            PipeCommand::SetSlot { index, value } => self.set_slot(index, value)?,
            PipeCommand::SetDelay(delay) => self.set_delay(delay),
            PipeCommand::Flush => self.flush(),
            PipeCommand::Clear => self.clear(),
        }
        Ok(())
    }

    /// Number of value slots.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.state.outlets.len()
    }

    /// Number of reference slots.
    #[must_use]
    pub fn reference_slots(&self) -> usize {
        self.state.reference_slots
    }

    /// Declared kinds in slot order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SlotKind> {
        self.state.slots.borrow().iter().map(SlotValue::kind).collect()
    }

    /// Current contents of live slot `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<SlotValue> {
        self.state.slots.borrow().get(index).cloned()
    }

    /// Current delay as stored.
    #[must_use]
    pub fn delay(&self) -> Millis {
        self.state.delay.get()
    }

    /// Number of deliveries in flight.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.pending.borrow().len()
    }

    /// Ids of deliveries in flight, newest first.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<DeliveryId> {
        self.state.pending.borrow().ids()
    }

    /// Whether `id` is still in flight.
    #[must_use]
    pub fn is_pending(&self, id: DeliveryId) -> bool {
        self.state.pending.borrow().contains(id)
    }

    /// Snapshot held by a pending delivery.
    #[must_use]
    pub fn pending_values(&self, id: DeliveryId) -> Option<Vec<SlotValue>> {
        self.state
            .pending
            .borrow()
            .get(id)
            .map(|delivery| delivery.values.clone())
    }

    /// Scheduled time of a pending delivery.
    #[must_use]
    pub fn pending_deadline(&self, id: DeliveryId) -> Option<Millis> {
        self.state
            .pending
            .borrow()
            .get(id)
            .and_then(|delivery| delivery.clock.deadline())
    }

    /// Conditions recorded so far.
    #[must_use]
    pub fn conditions(&self) -> &ConditionLog {
        &self.state.conditions
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("kinds", &self.kinds())
            .field("delay", &self.delay())
            .field("pending", &self.pending_len())
            .finish()
    }
}
