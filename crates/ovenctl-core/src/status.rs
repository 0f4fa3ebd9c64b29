//! Status Facade
//!
//! Read-only view of the engine for user interfaces.

use serde::Serialize;

use crate::engine::{EnginePhase, ProgramEngine};
use crate::oven::Oven;
use crate::telemetry::{self, round_to, Sample, TelemetryError};

/// Point-in-time engine status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusSnapshot {
    /// A run or calibration is active
    pub is_working: bool,
    /// Current engine phase
    pub phase: EnginePhase,
    /// Program of the active run
    pub running_program: Option<String>,
    /// Name of the active run
    pub run_name: Option<String>,
    /// Rounded to hundredths
    pub target_temperature: f64,
    /// Seconds since the run started
    pub time_seconds: f64,
    /// Most recent sample of the run
    pub last_sample: Option<Sample>,
}

/// Queries answered while a run is in progress
pub trait StatusFacade {
    /// Whether a run or calibration is active
    fn is_working(&self) -> bool;

    /// Name of the running program, `None` when idle or calibrating
    fn running_program(&self) -> Option<String>;

    /// Temperature the program currently asks for, in hundredths of a degree
    fn target_temperature(&self) -> f64;

    /// Seconds since the run started
    fn time_seconds(&self) -> f64;

    /// Every `step`-th sample of the current (or last) run
    fn samples(&self, step: usize) -> Vec<Sample>;

    /// Run log file names, excluding the active run
    fn ended_runs(&self) -> Result<Vec<String>, TelemetryError>;

    /// Everything above in one serializable value
    fn status(&self) -> StatusSnapshot;
}

impl<O: Oven + 'static> StatusFacade for ProgramEngine<O> {
    fn is_working(&self) -> bool {
        self.shared().status().phase != EnginePhase::Idle
    }

    fn running_program(&self) -> Option<String> {
        self.shared().status().program_name.clone()
    }

    fn target_temperature(&self) -> f64 {
        round_to(self.shared().status().target_temperature, 2)
    }

    fn time_seconds(&self) -> f64 {
        self.shared().status().time_seconds
    }

    fn samples(&self, step: usize) -> Vec<Sample> {
        self.shared().recorder().samples(step)
    }

    fn ended_runs(&self) -> Result<Vec<String>, TelemetryError> {
        let active = self
            .shared()
            .status()
            .run_name
            .as_ref()
            .map(|run| format!("{run}.csv"));
        let mut runs = telemetry::list_runs(self.run_folder())?;
        runs.retain(|name| Some(name) != active.as_ref());
        Ok(runs)
    }

    fn status(&self) -> StatusSnapshot {
        let last_sample = self.shared().recorder().last().cloned();
        let status = self.shared().status();
        StatusSnapshot {
            is_working: status.phase != EnginePhase::Idle,
            phase: status.phase,
            running_program: status.program_name.clone(),
            run_name: status.run_name.clone(),
            target_temperature: round_to(status.target_temperature, 2),
            time_seconds: status.time_seconds,
            last_sample,
        }
    }
}
