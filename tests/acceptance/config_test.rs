//! Configuration acceptance tests.
//!
//! A configuration file on disk must produce a scheduler and objects that
//! honor its settings.

use std::io::Write;
use std::time::Duration;
use tempo_common::config::{TempoConfig, TimeSourceKind};
use tempo_common::time::DEFAULT_GRAIN;
use tempo_objects::{Delay, Line};
use tempo_runtime::{Recorder, Scheduler};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_file_drives_scheduler() {
    let file = write_config(
        r#"
        [scheduler]
        time_source = "logical"
        idle_sleep = "250us"
        max_fires_per_advance = 8

        [line]
        grain_ms = 40.0
        "#,
    );
    let config = TempoConfig::from_file(file.path()).unwrap();
    assert_eq!(config.scheduler.idle_sleep, Duration::from_micros(250));

    let scheduler = Scheduler::from_config(&config.scheduler);
    assert!(!scheduler.is_polled());

    // The fire limit defers a runaway zero-delay loop to the next advance
    let out = Recorder::new();
    let delays: Vec<Delay> = (0..20)
        .map(|_| Delay::new(&scheduler, 0.0, out.clone()))
        .collect();
    for delay in &delays {
        delay.trigger();
    }
    assert_eq!(scheduler.run_due(), 8);
    assert_eq!(scheduler.run_due(), 8);
    assert_eq!(scheduler.run_due(), 4);
    assert_eq!(out.len(), 20);

    let ramp = Recorder::stamped(&scheduler);
    let line = Line::new(&scheduler, 0.0, config.line.grain_ms, ramp.clone());
    line.set_next_duration(80.0);
    line.ramp_to(1.0);
    scheduler.advance_to(80.0);
    assert_eq!(ramp.times(), vec![0.0, 40.0, 80.0]);
}

#[test]
fn test_empty_config_uses_defaults() {
    let file = write_config("");
    let config = TempoConfig::from_file(file.path()).unwrap();

    assert_eq!(config.scheduler.time_source, TimeSourceKind::Logical);
    assert_eq!(config.line.grain_ms, DEFAULT_GRAIN);
}

#[test]
fn test_monotonic_scheduler_polls_wall_time() {
    let config = TempoConfig::from_toml("[scheduler]\ntime_source = \"monotonic\"\n").unwrap();
    let scheduler = Scheduler::from_config(&config.scheduler);
    assert!(scheduler.is_polled());

    let out = Recorder::new();
    let delay = Delay::new(&scheduler, 1.0, out.clone());
    delay.trigger();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while out.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
        scheduler.poll();
    }
    assert_eq!(out.len(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = write_config("[scheduler]\ntime_source = \"sundial\"\n");
    assert!(TempoConfig::from_file(file.path()).is_err());
}
