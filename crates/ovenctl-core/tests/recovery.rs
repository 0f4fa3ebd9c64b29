//! Tests for resuming interrupted runs

mod support;

use support::{settings, ScriptedOven};
use chrono::{Duration as WallDuration, Local, SubsecRound};
use ovenctl_core::checkpoint::{Checkpoint, CheckpointStore};
use ovenctl_core::engine::{ProgramEngine, RecoveryOutcome, RunOutcome};
use ovenctl_core::program::{Program, Segment};
use ovenctl_core::status::StatusFacade;
use ovenctl_core::telemetry::{RunLog, Sample};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const RUN: &str = "2024-03-01T08-00-00-Bisque";

fn catalog() -> HashMap<String, Program> {
    let mut program = Program::new(
        "Bisque",
        vec![
            Segment::new("Up", 100.0, 10.0).with_restart(30.0),
            Segment::new("Dry", 100.0, 60.0).with_restart(30.0),
            Segment::new("Fire", 950.0, 240.0).with_restart(30.0),
            Segment::new("Cool", 500.0, 60.0),
        ],
    );
    program.air_close_at_degrees = 600.0;
    HashMap::from([(program.name.clone(), program)])
}

/// Leave behind what a crashed run in `segment` would have written
fn interrupted_run(runs: &Path, segment: &str, minutes_ago: i64) {
    fs::create_dir_all(runs).unwrap();
    let log = RunLog::create(runs, RUN).unwrap();
    let timestamp = (Local::now() - WallDuration::minutes(minutes_ago))
        .naive_local()
        .trunc_subsecs(0);
    log.append(&[Sample {
        program_name: "Bisque".into(),
        segment_name: segment.into(),
        seconds_from_start: 3600.0,
        timestamp,
        desired_temperature: 100.0,
        measured_temperature: 99.0,
        power_fraction: 0.2,
        vent_closed: false,
    }])
    .unwrap();
    CheckpointStore::new(runs)
        .save(&Checkpoint::new("Bisque", segment, RUN))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_checkpoint_stays_idle() {
    let dir = TempDir::new().unwrap();
    let engine =
        ProgramEngine::new(ScriptedOven::new([25.0]), settings(dir.path()), &catalog()).unwrap();
    assert_eq!(engine.recovery(), &RecoveryOutcome::NoCheckpoint);
    assert!(!engine.is_working());
}

#[tokio::test(start_paused = true)]
async fn test_hold_resumes_from_preceding_ramp() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    interrupted_run(&settings.saved_run_folder, "Dry", 5);

    let engine = ProgramEngine::new(ScriptedOven::new([90.0]), settings, &catalog()).unwrap();
    assert_eq!(
        engine.recovery(),
        &RecoveryOutcome::Resumed {
            program_name: "Bisque".into(),
            segment_name: "Up".into(),
            run_name: RUN.into(),
        }
    );
    assert!(engine.is_working());
    assert_eq!(engine.running_program().as_deref(), Some("Bisque"));
    assert_eq!(engine.time_seconds(), 3600.0);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let samples = engine.samples(1);
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].segment_name, "Dry");
    assert_eq!(samples[1].segment_name, "Up");
    assert_eq!(samples[2].seconds_from_start, 3602.0);

    let checkpoint = CheckpointStore::new(engine.run_folder()).load().unwrap();
    assert_eq!(checkpoint, Some(Checkpoint::new("Bisque", "Up", RUN)));

    engine.request_stop();
    assert_eq!(engine.wait_idle().await, Some(RunOutcome::Stopped));

    // Same run log, still a single header
    let log = RunLog::existing(engine.run_folder(), RUN);
    assert_eq!(log.read().unwrap().len(), 3);
    let content = fs::read_to_string(log.path()).unwrap();
    assert_eq!(content.matches("Program name").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ascending_segment_resumes_in_place() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    interrupted_run(&settings.saved_run_folder, "Fire", 10);

    let engine = ProgramEngine::new(ScriptedOven::new([400.0]), settings, &catalog()).unwrap();
    assert!(matches!(
        engine.recovery(),
        RecoveryOutcome::Resumed { segment_name, .. } if segment_name == "Fire"
    ));

    engine.request_stop();
    engine.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_checkpoint_cleared() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    interrupted_run(&settings.saved_run_folder, "Dry", 120);

    let engine = ProgramEngine::new(ScriptedOven::new([25.0]), settings, &catalog()).unwrap();
    assert!(matches!(engine.recovery(), RecoveryOutcome::Discarded { .. }));
    assert!(!engine.is_working());
    assert!(!CheckpointStore::new(engine.run_folder()).exists());
    engine.with_oven(|oven| assert!(oven.calls.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_segment_without_restart_cleared() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    interrupted_run(&settings.saved_run_folder, "Cool", 1);

    let engine = ProgramEngine::new(ScriptedOven::new([25.0]), settings, &catalog()).unwrap();
    assert!(matches!(engine.recovery(), RecoveryOutcome::Discarded { .. }));
    assert!(!CheckpointStore::new(engine.run_folder()).exists());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_program_cleared() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    interrupted_run(&settings.saved_run_folder, "Dry", 1);

    let engine =
        ProgramEngine::new(ScriptedOven::new([25.0]), settings, &HashMap::new()).unwrap();
    assert!(matches!(
        engine.recovery(),
        RecoveryOutcome::Discarded { reason } if reason.contains("Bisque")
    ));
    assert!(!engine.is_working());
    assert!(!CheckpointStore::new(engine.run_folder()).exists());
}

#[tokio::test(start_paused = true)]
async fn test_garbled_checkpoint_cleared() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    fs::create_dir_all(&settings.saved_run_folder).unwrap();
    let store = CheckpointStore::new(&settings.saved_run_folder);
    fs::write(store.path(), "only-one-field\n").unwrap();

    let engine = ProgramEngine::new(ScriptedOven::new([25.0]), settings, &catalog()).unwrap();
    assert!(matches!(engine.recovery(), RecoveryOutcome::Discarded { .. }));
    assert!(!store.exists());
}
