//! Program Execution Engine
//!
//! Runs one firing program at a time on an [`Oven`]: segments are executed
//! in order by a background tokio task, each under either trajectory PID
//! control (ramps) or setpoint PID control (holds). Progress is recorded
//! as telemetry and a checkpoint file lets an interrupted run resume after
//! a restart.
//!
//! The engine is cheap to clone; all clones drive the same oven.

mod control;
mod error;
mod recovery;
mod run;
mod segment;

pub use control::{clamp_power, HoldController, PidGains, RampController};
pub use error::EngineError;
pub use recovery::RecoveryOutcome;
pub use segment::{resume_index, SegmentKind};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::ControllerSettings;
use crate::oven::{Oven, OvenError};
use crate::program::{Program, ProgramCatalog};
use crate::telemetry::{self, Sample, TelemetryRecorder};
use recovery::ResumePlan;

/// How long [`ProgramEngine::set_power_one_minute`] holds its power
pub const CALIBRATION_DURATION: Duration = Duration::from_secs(60);

/// What the engine is doing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnginePhase {
    /// Nothing running
    #[default]
    Idle,
    /// A run was accepted and its task is starting up
    Starting,
    /// A run is executing a segment
    Running(SegmentKind),
    /// Fixed power calibration
    Calibrating,
}

/// Result of asking the engine to start a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The run task was spawned under `run_name`
    Started { run_name: String },
    /// Another run or a calibration is active
    Rejected,
}

/// How a run or calibration ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every segment ran, or the calibration minute elapsed
    Completed,
    /// Ended by [`ProgramEngine::request_stop`]
    Stopped,
    /// Aborted by an oven error
    Faulted(OvenError),
}

/// Mutable state guarded by one lock
#[derive(Debug, Default)]
pub(crate) struct EngineStatus {
    pub(crate) phase: EnginePhase,
    pub(crate) program_name: Option<String>,
    pub(crate) run_name: Option<String>,
    pub(crate) target_temperature: f64,
    pub(crate) time_seconds: f64,
    stop: CancellationToken,
    task: Option<JoinHandle<RunOutcome>>,
    last_outcome: Option<RunOutcome>,
}

/// State shared between the engine handle and its run task
pub(crate) struct Shared<O> {
    oven: Mutex<O>,
    settings: ControllerSettings,
    run_folder: PathBuf,
    checkpoint: CheckpointStore,
    status: Mutex<EngineStatus>,
    recorder: Mutex<TelemetryRecorder>,
}

impl<O> Shared<O> {
    fn oven(&self) -> MutexGuard<'_, O> {
        self.oven.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> MutexGuard<'_, EngineStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn recorder(&self) -> MutexGuard<'_, TelemetryRecorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: EnginePhase) {
        self.status().phase = phase;
    }

    fn set_target_temperature(&self, target: f64) {
        self.status().target_temperature = target;
    }

    fn set_time_seconds(&self, seconds: f64) {
        self.status().time_seconds = seconds;
    }

    /// Return to idle after a run or calibration
    fn finish(&self, outcome: &RunOutcome) {
        let mut status = self.status();
        status.phase = EnginePhase::Idle;
        status.program_name = None;
        status.run_name = None;
        status.last_outcome = Some(outcome.clone());
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) {
        if let Err(e) = self.checkpoint.save(checkpoint) {
            tracing::warn!("Failed to write checkpoint {}: {e}", self.checkpoint.path().display());
        }
    }

    fn clear_checkpoint(&self) {
        if let Err(e) = self.checkpoint.clear() {
            tracing::warn!("Failed to remove checkpoint {}: {e}", self.checkpoint.path().display());
        }
    }
}

/// Handle to the program execution engine
pub struct ProgramEngine<O> {
    shared: Arc<Shared<O>>,
    recovery: RecoveryOutcome,
}

impl<O> Clone for ProgramEngine<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            recovery: self.recovery.clone(),
        }
    }
}

impl<O: Oven + 'static> ProgramEngine<O> {
    /// Create an engine driving `oven`.
    ///
    /// Settings are validated first. If a checkpoint from an interrupted
    /// run exists, the run is resumed when possible. Must be called inside
    /// a tokio runtime.
    pub fn new(
        oven: O,
        settings: ControllerSettings,
        catalog: &dyn ProgramCatalog,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let run_folder = settings.saved_run_folder.clone();
        fs::create_dir_all(&run_folder)?;

        let shared = Arc::new(Shared {
            oven: Mutex::new(oven),
            checkpoint: CheckpointStore::new(&run_folder),
            run_folder,
            settings,
            status: Mutex::default(),
            recorder: Mutex::default(),
        });
        let mut engine = Self {
            shared,
            recovery: RecoveryOutcome::NoCheckpoint,
        };
        engine.recovery = engine.recover(catalog);
        Ok(engine)
    }

    /// What happened to the checkpoint found at construction
    pub fn recovery(&self) -> &RecoveryOutcome {
        &self.recovery
    }

    /// Controller settings in use
    pub fn settings(&self) -> &ControllerSettings {
        &self.shared.settings
    }

    /// Folder holding run logs and the checkpoint
    pub fn run_folder(&self) -> &Path {
        &self.shared.run_folder
    }

    /// Current phase
    pub fn phase(&self) -> EnginePhase {
        self.shared.status().phase
    }

    /// How the most recent run or calibration ended
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.shared.status().last_outcome.clone()
    }

    /// Start `program`.
    ///
    /// An empty or missing `run_name` is derived from the local time and
    /// the program name. Returns [`StartOutcome::Rejected`] when the oven is
    /// busy.
    pub fn start_program(&self, program: Program, run_name: Option<String>) -> StartOutcome {
        self.launch(program, run_name, None)
    }

    /// Look `name` up in `catalog` and start it
    pub fn start_named(
        &self,
        catalog: &dyn ProgramCatalog,
        name: &str,
        run_name: Option<String>,
    ) -> Result<StartOutcome, EngineError> {
        let program = catalog
            .programs()
            .remove(name)
            .ok_or_else(|| EngineError::ProgramNotFound(name.to_string()))?;
        Ok(self.start_program(program, run_name))
    }

    /// Ask the active run or calibration to stop at its next tick.
    ///
    /// Returns false when nothing is running.
    pub fn request_stop(&self) -> bool {
        let status = self.shared.status();
        if status.phase == EnginePhase::Idle {
            return false;
        }
        tracing::info!("Stop requested");
        status.stop.cancel();
        true
    }

    /// Drive the oven at a fixed `power` fraction for one minute
    pub fn set_power_one_minute(&self, power: f64) -> Result<(), EngineError> {
        let mut status = self.shared.status();
        if status.phase != EnginePhase::Idle {
            return Err(EngineError::Busy);
        }
        self.shared.oven().set_percentual(0.0)?;

        let stop = CancellationToken::new();
        status.phase = EnginePhase::Calibrating;
        status.program_name = None;
        status.run_name = None;
        status.stop = stop.clone();
        status.task = Some(tokio::spawn(run::calibrate(
            Arc::clone(&self.shared),
            clamp_power(power),
            CALIBRATION_DURATION,
            stop,
        )));
        Ok(())
    }

    /// Wait for the active task to end.
    ///
    /// Returns `None` if nothing was started since the last wait.
    pub async fn wait_idle(&self) -> Option<RunOutcome> {
        let handle = self.shared.status().task.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("Run task failed: {e}");
                None
            }
        }
    }

    /// Read the oven temperature directly
    pub fn read_temperature(&self) -> Result<f64, EngineError> {
        Ok(self.shared.oven().temperature()?)
    }

    /// Run `f` with exclusive access to the oven
    pub fn with_oven<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        f(&mut self.shared.oven())
    }

    /// Move ended run logs to `destination`
    pub fn archive_runs(&self, destination: &Path) -> Result<Vec<String>, EngineError> {
        let active = self.shared.status().run_name.clone();
        Ok(telemetry::archive_runs(
            &self.shared.run_folder,
            destination,
            active.as_deref(),
        )?)
    }

    pub(crate) fn shared(&self) -> &Shared<O> {
        &self.shared
    }

    fn launch(
        &self,
        program: Program,
        run_name: Option<String>,
        history: Option<Vec<Sample>>,
    ) -> StartOutcome {
        let mut status = self.shared.status();
        if status.phase != EnginePhase::Idle {
            tracing::info!("Start of '{}' rejected: oven busy", program.name);
            return StartOutcome::Rejected;
        }

        let run_name = match run_name {
            Some(name) if !name.is_empty() => name,
            _ => derive_run_name(&program.name, &Local::now()),
        };
        let elapsed = history
            .as_ref()
            .and_then(|samples| samples.last())
            .map_or(0.0, |sample| sample.seconds_from_start);

        {
            let mut recorder = self.shared.recorder();
            match history {
                Some(samples) => recorder.restore(samples),
                None => recorder.clear(),
            }
        }
        self.shared
            .save_checkpoint(&Checkpoint::new(&program.name, "", &run_name));

        let stop = CancellationToken::new();
        status.phase = EnginePhase::Starting;
        status.program_name = Some(program.name.clone());
        status.run_name = Some(run_name.clone());
        status.target_temperature = 0.0;
        status.time_seconds = elapsed;
        status.stop = stop.clone();

        tracing::info!("Starting program '{}' as run '{run_name}'", program.name);
        status.task = Some(tokio::spawn(run::execute(
            Arc::clone(&self.shared),
            program,
            run_name.clone(),
            elapsed,
            stop,
        )));
        StartOutcome::Started { run_name }
    }

    fn recover(&self, catalog: &dyn ProgramCatalog) -> RecoveryOutcome {
        let checkpoint = match self.shared.checkpoint.load() {
            Ok(None) => return RecoveryOutcome::NoCheckpoint,
            Ok(Some(checkpoint)) => checkpoint,
            Err(e) => return self.discard(format!("checkpoint is unreadable: {e}")),
        };

        let now = Local::now().naive_local();
        match recovery::plan(&checkpoint, catalog, &self.shared.run_folder, now) {
            ResumePlan::Discard(reason) => self.discard(reason),
            ResumePlan::Resume { program, history } => {
                let segment_name = program
                    .points
                    .first()
                    .map(|s| s.segment_name.clone())
                    .unwrap_or_default();
                let program_name = program.name.clone();
                tracing::info!(
                    "Resuming run '{}' of '{program_name}' at segment '{segment_name}'",
                    checkpoint.run_name
                );
                match self.launch(program, Some(checkpoint.run_name), Some(history)) {
                    StartOutcome::Started { run_name } => RecoveryOutcome::Resumed {
                        program_name,
                        segment_name,
                        run_name,
                    },
                    StartOutcome::Rejected => {
                        self.discard("engine was already busy".to_string())
                    }
                }
            }
        }
    }

    fn discard(&self, reason: String) -> RecoveryOutcome {
        tracing::warn!("Not resuming interrupted run: {reason}");
        self.shared.clear_checkpoint();
        RecoveryOutcome::Discarded { reason }
    }
}

/// Run name for `program` started at `now`
pub fn derive_run_name<Tz: TimeZone>(program: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}-{program}", now.format("%Y-%m-%dT%H-%M-%S"))
}
