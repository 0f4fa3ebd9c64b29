//! Test oven replaying scripted temperature readings

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;

use ovenctl_core::config::ControllerSettings;
use ovenctl_core::oven::{Oven, OvenError, SensorError};

/// Actuation recorded by [`ScriptedOven`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init,
    End,
    OpenAir,
    CloseAir,
    Power(f64),
}

/// Oven returning readings from a script; the last reading repeats
pub struct ScriptedOven {
    readings: VecDeque<f64>,
    last: f64,
    fault_after: Option<usize>,
    reads: usize,
    power_limit: Option<usize>,
    power_writes: usize,
    fraction: f64,
    pub calls: Vec<Call>,
}

impl ScriptedOven {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        let readings: VecDeque<f64> = readings.into_iter().collect();
        Self {
            last: readings.front().copied().unwrap_or(25.0),
            readings,
            fault_after: None,
            reads: 0,
            power_limit: None,
            power_writes: 0,
            fraction: 0.0,
            calls: Vec::new(),
        }
    }

    /// Fail every reading after the first `reads`
    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fault_after = Some(reads);
        self
    }

    /// Reject every non-zero power write after the first `writes`.
    /// Cutting power always succeeds.
    pub fn rejecting_power_after(mut self, writes: usize) -> Self {
        self.power_limit = Some(writes);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Power(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}

impl Oven for ScriptedOven {
    fn temperature(&mut self) -> Result<f64, OvenError> {
        if self.fault_after.is_some_and(|limit| self.reads >= limit) {
            return Err(SensorError::OpenCircuit.into());
        }
        self.reads += 1;
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }

    fn percentual(&self) -> f64 {
        self.fraction
    }

    fn max_power(&self) -> f64 {
        6000.0
    }

    fn set_percentual(&mut self, fraction: f64) -> Result<(), OvenError> {
        if fraction != 0.0 {
            if self.power_limit.is_some_and(|limit| self.power_writes >= limit) {
                return Err(OvenError::Actuator("regulator not responding".into()));
            }
            self.power_writes += 1;
        }
        self.fraction = fraction;
        self.calls.push(Call::Power(fraction));
        Ok(())
    }

    fn init_start_program(&mut self) -> Result<(), OvenError> {
        self.calls.push(Call::Init);
        Ok(())
    }

    fn end_program(&mut self) -> Result<(), OvenError> {
        self.calls.push(Call::End);
        Ok(())
    }

    fn open_air(&mut self) -> Result<(), OvenError> {
        self.calls.push(Call::OpenAir);
        Ok(())
    }

    fn close_air(&mut self) -> Result<(), OvenError> {
        self.calls.push(Call::CloseAir);
        Ok(())
    }
}

/// Default settings with folders inside `dir`
pub fn settings(dir: &Path) -> ControllerSettings {
    ControllerSettings {
        saved_run_folder: dir.join("runs"),
        program_folder: dir.join("programs"),
        ..ControllerSettings::default()
    }
}
