//! Timing acceptance tests for delay, metro, line, and timer.
//!
//! # Acceptance Criteria
//!
//! - A stopped delay never fires, whatever its duration
//! - A metro started at t0 with interval d bangs exactly at t0 + k*d
//! - A ramp ends exactly on its target at start + duration, with monotonic
//!   intermediate values
//! - A ramp without a staged duration jumps synchronously
//! - The timer reports elapsed logical time without resetting

use super::common::{close, non_decreasing, non_increasing, reacting, rig};
use tempo_objects::{Delay, DelayCommand, Line, LineCommand, Metro, Timer};
use tempo_runtime::Output;

#[test]
fn test_delay_stop_suppresses_any_duration() {
    for duration in [0.0, 0.5, 1.0, 17.0, 1000.0, 86_400_000.0] {
        let (scheduler, out) = rig(1);
        let delay = Delay::new(&scheduler, duration, out[0].clone());

        scheduler.advance_to(3.0);
        delay.trigger();
        delay.stop();
        scheduler.advance_to(duration + 10.0);

        assert!(out[0].is_empty(), "delay of {duration} fired after stop");
        assert_eq!(scheduler.armed(), 0);
    }
}

#[test]
fn test_delay_commands_sequence() {
    let (scheduler, out) = rig(1);
    let delay = Delay::new(&scheduler, 100.0, out[0].clone());

    for command in [
        DelayCommand::SetDelay(40.0),
        DelayCommand::Bang,
        DelayCommand::Float(-5.0),
    ] {
        delay.apply(command);
    }
    // The last command re-armed with a clamped zero delay
    scheduler.run_due();
    assert_eq!(out[0].times(), vec![0.0]);

    delay.apply(DelayCommand::Bang);
    scheduler.advance_to(100.0);
    assert_eq!(out[0].len(), 2);
}

#[test]
fn test_metro_fires_on_grid() {
    for (start, interval) in [(0.0, 1.0), (5.0, 25.0), (12.5, 333.3)] {
        let (scheduler, out) = rig(1);
        let metro = Metro::new(&scheduler, interval, out[0].clone());

        scheduler.advance_to(start);
        metro.start();
        scheduler.advance_to(start + interval * 50.0 + interval / 2.0);
        metro.stop();

        let times = out[0].times();
        assert_eq!(times.len(), 51);
        for (k, at) in times.iter().enumerate() {
            let expected = start + interval * k as f64;
            assert!(close(*at, expected, 1e-6), "bang {k} at {at}, expected {expected}");
        }
    }
}

#[test]
fn test_metro_drives_delay() {
    let (scheduler, out) = rig(2);
    let delay = Delay::new(&scheduler, 15.0, out[1].clone());
    let (outlet, slot) = reacting(&out[0], |delay: &Delay, _| delay.trigger());
    let _ = slot.set(delay);
    let metro = Metro::new(&scheduler, 100.0, outlet);

    metro.start();
    scheduler.advance_to(350.0);

    assert_eq!(out[0].times(), vec![0.0, 100.0, 200.0, 300.0]);
    assert_eq!(out[1].times(), vec![15.0, 115.0, 215.0, 315.0]);
}

#[test]
fn test_metro_self_stop_after_count() {
    let (scheduler, out) = rig(1);
    let (outlet, slot) = reacting(&out[0], |metro: &Metro, _| metro.stop());
    let metro = Metro::new(&scheduler, 10.0, outlet);
    let _ = slot.set(metro.clone());

    metro.start();
    scheduler.advance_to(100.0);

    assert_eq!(out[0].times(), vec![0.0]);
    assert!(!metro.is_running());
}

#[test]
fn test_ramp_lands_exactly_on_target() {
    for (from, to, duration, grain) in [
        (0.0, 1.0, 100.0, 20.0),
        (10.0, -3.0, 95.0, 7.0),
        (0.0, 127.0, 1000.0, 33.0),
        (5.0, 6.0, 3.0, 20.0),
    ] {
        let (scheduler, out) = rig(1);
        let line = Line::new(&scheduler, from, grain, out[0].clone());

        scheduler.advance_to(50.0);
        line.set_next_duration(duration);
        line.ramp_to(to);
        scheduler.advance_to(50.0 + duration + 100.0);

        let values = out[0].floats();
        let times = out[0].times();
        assert_eq!(values.first(), Some(&from));
        assert_eq!(values.last(), Some(&to));
        assert!(close(*times.last().unwrap(), 50.0 + duration, 1e-9));
        if to >= from {
            assert!(non_decreasing(&values));
        } else {
            assert!(non_increasing(&values));
        }
        assert!(!line.is_ramping());
    }
}

#[test]
fn test_ramp_without_duration_is_immediate() {
    let (scheduler, out) = rig(1);
    let line = Line::new(&scheduler, 0.0, 20.0, out[0].clone());

    line.ramp_to(4.0);
    assert_eq!(out[0].outputs(), vec![Output::Float(4.0)]);
    assert_eq!(scheduler.armed(), 0);

    // The staged duration applies to one ramp only
    line.set_next_duration(40.0);
    line.ramp_to(8.0);
    scheduler.advance_to(40.0);
    line.ramp_to(0.0);
    assert_eq!(out[0].floats().last(), Some(&0.0));
    assert_eq!(scheduler.armed(), 0);
}

#[test]
fn test_ramp_retarget_midway_continues_from_current_value() {
    let (scheduler, out) = rig(1);
    let line = Line::new(&scheduler, 0.0, 10.0, out[0].clone());

    line.apply(LineCommand::SetDuration(100.0));
    line.apply(LineCommand::Float(100.0));
    scheduler.advance_to(50.0);
    line.apply(LineCommand::SetDuration(50.0));
    line.apply(LineCommand::Float(0.0));
    scheduler.advance_to(200.0);

    let values = out[0].floats();
    let split = values.iter().position(|v| (*v - 50.0).abs() < 1e-9).unwrap();
    assert!(non_decreasing(&values[..=split]));
    assert!(non_increasing(&values[split..]));
    assert_eq!(values.last(), Some(&0.0));
    assert_eq!(out[0].times().last(), Some(&100.0));
}

#[test]
fn test_ramp_stop_freezes() {
    let (scheduler, out) = rig(1);
    let line = Line::new(&scheduler, 0.0, 25.0, out[0].clone());

    line.set_next_duration(100.0);
    line.ramp_to(1.0);
    scheduler.advance_to(60.0);
    line.apply(LineCommand::Stop);
    scheduler.advance_to(500.0);

    assert_eq!(out[0].floats(), vec![0.0, 0.25, 0.5]);
    assert_eq!(line.value(), 0.5);
}

#[test]
fn test_timer_measures_between_events() {
    let (scheduler, out) = rig(2);
    let timer = Timer::new(&scheduler, out[1].clone());
    let delay = Delay::new(&scheduler, 70.0, out[0].clone());

    scheduler.advance_to(30.0);
    timer.mark();
    delay.trigger();
    scheduler.advance_to(100.0);
    timer.query();
    scheduler.advance_to(150.0);
    timer.query();

    assert_eq!(out[0].times(), vec![100.0]);
    assert_eq!(out[1].floats(), vec![70.0, 120.0]);
}
