//! Pipe acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Each pending delivery emits the values it was enqueued with
//! - Flush emits every pending delivery now and nothing later
//! - Clear emits nothing, now or later
//! - Binding holder counts always equal the number of live copies
//! - Stale references are skipped without losing the other slots

use super::common::{outlets, reacting, rig};
use tempo_common::binding::BindingAnchor;
use tempo_common::error::TempoError;
use tempo_common::value::{SlotKind, Symbol, TaggedValue};
use tempo_objects::{Pipe, PipeCommand, PipeLayout};
use tempo_runtime::Output;

fn args(values: &[TaggedValue]) -> Vec<TaggedValue> {
    values.to_vec()
}

#[test]
fn test_number_symbol_scenario() {
    let (scheduler, out) = rig(2);
    let pipe = Pipe::from_args(
        &scheduler,
        &args(&["f".into(), "s".into(), 50.0.into()]),
        outlets(&out),
    );

    pipe.enqueue(&[3.0.into(), "x".into()]);
    scheduler.advance_to(10.0);
    pipe.set_slot(0, 9.0.into()).unwrap();
    scheduler.advance_to(100.0);

    assert_eq!(out[0].outputs(), vec![Output::Float(3.0)]);
    assert_eq!(out[1].outputs(), vec![Output::Symbol(Symbol::intern("x"))]);
    assert_eq!(out[0].times(), vec![50.0]);

    // The live slot kept the later write
    pipe.enqueue(&[]);
    scheduler.advance_to(150.0);
    assert_eq!(out[0].floats(), vec![3.0, 9.0]);
}

#[test]
fn test_many_in_flight_keep_their_snapshots() {
    let (scheduler, out) = rig(1);
    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Number], 100.0), outlets(&out));

    for k in 0..20 {
        scheduler.advance_to(f64::from(k) * 5.0);
        pipe.enqueue(&[f64::from(k).into()]);
    }
    assert_eq!(pipe.pending_len(), 20);

    scheduler.advance_to(1000.0);
    let expected: Vec<f64> = (0..20).map(f64::from).collect();
    assert_eq!(out[0].floats(), expected);
    let times: Vec<f64> = (0..20).map(|k| 100.0 + f64::from(k) * 5.0).collect();
    assert_eq!(out[0].times(), times);
}

#[test]
fn test_flush_then_nothing_later() {
    let (scheduler, out) = rig(2);
    let pipe = Pipe::new(
        &scheduler,
        PipeLayout::new(&[SlotKind::Number, SlotKind::Symbol], 250.0),
        outlets(&out),
    );

    pipe.enqueue(&[1.0.into(), "a".into()]);
    scheduler.advance_to(100.0);
    pipe.enqueue(&[2.0.into(), "b".into()]);
    pipe.apply(PipeCommand::Flush).unwrap();

    assert_eq!(out[0].floats(), vec![2.0, 1.0]);
    assert_eq!(out[0].times(), vec![100.0, 100.0]);
    assert_eq!(pipe.pending_len(), 0);

    scheduler.advance_to(10_000.0);
    assert_eq!(out[0].len(), 2);
    assert_eq!(out[1].len(), 2);
}

#[test]
fn test_clear_emits_nothing() {
    let (scheduler, out) = rig(1);
    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Number], 10.0), outlets(&out));

    for k in 0..5 {
        pipe.enqueue(&[f64::from(k).into()]);
    }
    pipe.apply(PipeCommand::Clear).unwrap();
    scheduler.advance_to(1000.0);

    assert!(out[0].is_empty());
    assert_eq!(scheduler.armed(), 0);
}

#[test]
fn test_holder_count_tracks_copies() {
    let (scheduler, out) = rig(2);
    let pipe = Pipe::from_args(
        &scheduler,
        &args(&["p".into(), "f".into(), 30.0.into()]),
        outlets(&out),
    );
    let anchor = BindingAnchor::new();
    assert_eq!(pipe.reference_slots(), 1);

    pipe.enqueue(&[anchor.bind().into(), 1.0.into()]);
    // Live slot plus one delivery
    assert_eq!(anchor.holders(), 2);

    for _ in 0..3 {
        pipe.enqueue(&[]);
    }
    assert_eq!(anchor.holders(), 5);

    scheduler.advance_to(30.0);
    // Deliveries released, recorder keeps the four emitted copies
    assert_eq!(anchor.holders(), 5);
    out[0].clear();
    assert_eq!(anchor.holders(), 1);

    pipe.enqueue(&[]);
    pipe.apply(PipeCommand::Clear).unwrap();
    assert_eq!(anchor.holders(), 1);

    drop(pipe);
    assert_eq!(anchor.holders(), 0);
}

#[test]
fn test_teardown_waits_for_pending_deliveries() {
    let (scheduler, out) = rig(1);
    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Reference], 40.0), outlets(&out));
    let torn_down = std::rc::Rc::new(std::cell::Cell::new(false));
    let anchor = BindingAnchor::new();
    {
        let torn_down = std::rc::Rc::clone(&torn_down);
        anchor.on_teardown(move || torn_down.set(true));
    }

    pipe.enqueue(&[anchor.bind().into()]);
    anchor.revoke();
    assert!(!torn_down.get());

    scheduler.advance_to(40.0);
    assert!(out[0].is_empty());
    assert_eq!(
        pipe.conditions().drain(),
        vec![TempoError::StaleReference { slot: 0 }]
    );
    // The live slot still holds a copy
    assert!(!torn_down.get());

    pipe.set_slot(0, BindingAnchor::new().bind().into()).unwrap();
    assert!(torn_down.get());
}

#[test]
fn test_stale_reference_other_slots_delivered() {
    let (scheduler, out) = rig(3);
    let pipe = Pipe::new(
        &scheduler,
        PipeLayout::new(&[SlotKind::Symbol, SlotKind::Reference, SlotKind::Number], 20.0),
        outlets(&out),
    );
    let anchor = BindingAnchor::new();

    pipe.enqueue(&["tag".into(), anchor.bind().into(), 7.0.into()]);
    anchor.invalidate();
    pipe.enqueue(&["tag".into(), anchor.bind().into(), 8.0.into()]);
    scheduler.advance_to(20.0);

    assert_eq!(out[0].len(), 2);
    assert_eq!(out[1].len(), 1);
    assert_eq!(out[2].floats(), vec![7.0, 8.0]);
    assert_eq!(pipe.conditions().total(), 1);
}

#[test]
fn test_creation_problems_are_recorded() {
    let (scheduler, out) = rig(2);
    let pipe = Pipe::from_args(
        &scheduler,
        &args(&["z".into(), "s".into(), "later".into()]),
        outlets(&out),
    );

    assert_eq!(pipe.kinds(), vec![SlotKind::Number, SlotKind::Symbol]);
    assert_eq!(pipe.delay(), 0.0);
    let conditions = pipe.conditions().drain();
    assert!(conditions.contains(&TempoError::BadDelayArgument {
        argument: "later".to_string()
    }));
    assert!(conditions.contains(&TempoError::UnsupportedTypeTag {
        slot: 0,
        tag: "z".to_string()
    }));

    // Zero delay still delivers on the next run
    pipe.enqueue(&[1.0.into(), "q".into()]);
    scheduler.run_due();
    assert_eq!(out[0].floats(), vec![1.0]);
}

#[test]
fn test_reentrant_enqueue_from_outlet() {
    let (scheduler, out) = rig(1);
    let (outlet, slot) = reacting(&out[0], |pipe: &Pipe, output| {
        if let Output::Float(v) = output {
            if *v < 4.0 {
                pipe.enqueue(&[(v + 1.0).into()]);
            }
        }
    });
    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Number], 25.0), vec![outlet]);
    let _ = slot.set(pipe.clone());

    pipe.enqueue(&[1.0.into()]);
    scheduler.advance_to(1000.0);

    assert_eq!(out[0].floats(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(out[0].times(), vec![25.0, 50.0, 75.0, 100.0]);
}
