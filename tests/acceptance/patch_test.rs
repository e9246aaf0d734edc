//! Multi-object chains on one scheduler.
//!
//! Objects are wired outlet to inlet the way a host patch would wire them,
//! and the whole chain runs inside a single advance.

use super::common::{reacting, rig};
use std::rc::Rc;
use tempo_common::value::{SlotKind, TaggedValue};
use tempo_objects::{Delay, Line, Metro, Pipe, PipeLayout, Timer};
use tempo_runtime::{Discard, OutletRef, Output, Recorder};

#[test]
fn test_metro_feeds_pipe_feeds_line() {
    let (scheduler, out) = rig(2);

    // line <- pipe <- metro
    let line = Line::new(&scheduler, 0.0, 10.0, out[1].clone());
    let (to_line, line_slot) = reacting(&out[0], |line: &Line, output| {
        if let Output::Float(target) = output {
            line.set_next_duration(20.0);
            line.ramp_to(*target);
        }
    });
    let _ = line_slot.set(line);

    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Number], 15.0), vec![to_line]);
    let counter = Rc::new(std::cell::Cell::new(0.0));
    let feed = {
        let pipe = pipe.clone();
        let counter = Rc::clone(&counter);
        move |_: &Output| {
            counter.set(counter.get() + 1.0);
            pipe.enqueue(&[TaggedValue::Number(counter.get())]);
        }
    };
    let metro = Metro::new(&scheduler, 100.0, Rc::new(feed));

    metro.start();
    scheduler.advance_to(250.0);
    metro.stop();

    // Pipe delivers 15 after each bang
    assert_eq!(out[0].times(), vec![15.0, 115.0, 215.0]);
    assert_eq!(out[0].floats(), vec![1.0, 2.0, 3.0]);

    // Each ramp ends on its target 20 later
    let ramp = out[1].emissions();
    for (end, target) in [(35.0, 1.0), (135.0, 2.0), (235.0, 3.0)] {
        assert!(ramp
            .iter()
            .any(|e| e.at == end && e.output == Output::Float(target)));
    }
    assert_eq!(scheduler.armed(), 0);
}

#[test]
fn test_timer_measures_delay_chain() {
    let (scheduler, out) = rig(1);
    let timer = Timer::new(&scheduler, out[0].clone());

    let silent = Recorder::new();

    let (to_timer, timer_slot) = reacting(&silent, |timer: &Timer, _| {
        timer.query();
    });
    let _ = timer_slot.set(timer);

    let second = Delay::new(&scheduler, 30.0, to_timer);
    let (to_second, second_slot) = reacting(&silent, |delay: &Delay, _| {
        delay.trigger();
    });
    let _ = second_slot.set(second);

    let first = Delay::new(&scheduler, 45.0, to_second);
    first.trigger();
    scheduler.advance_to(500.0);

    assert_eq!(out[0].floats(), vec![75.0]);
    assert_eq!(out[0].times(), vec![75.0]);
}

#[test]
fn test_dropping_objects_mid_run_is_quiet() {
    let (scheduler, out) = rig(1);
    let discard: OutletRef = Rc::new(Discard);
    let metro = Metro::new(&scheduler, 5.0, discard);
    let delay = Delay::new(&scheduler, 50.0, out[0].clone());
    let pipe = Pipe::new(&scheduler, PipeLayout::new(&[SlotKind::Number], 50.0), vec![out[0].clone()]);

    metro.start();
    delay.trigger();
    pipe.enqueue(&[TaggedValue::Number(1.0)]);
    scheduler.advance_to(20.0);
    assert_eq!(scheduler.armed(), 3);

    drop(metro);
    drop(delay);
    drop(pipe);
    assert_eq!(scheduler.armed(), 0);
    scheduler.advance_to(200.0);
    assert!(out[0].is_empty());
}
