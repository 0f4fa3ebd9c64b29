//! Controller configuration
//!
//! JSON settings file with the control loop timing, the PID gains of both
//! control strategies, storage folders and the simulated oven model.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::PidGains;
use crate::oven::OvenModel;

/// Errors loading or validating the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllerSettings {
    /// Control period in seconds
    pub step_time: f64,
    /// Seconds between run log flushes
    pub step_save: f64,
    /// Ramp (trajectory tracking) proportional gain
    pub kp_ramp: f64,
    /// Ramp integral gain
    pub ki_ramp: f64,
    /// Ramp derivative gain
    pub kd_ramp: f64,
    /// Hold (setpoint tracking) proportional gain
    pub kp_maintain: f64,
    /// Hold integral gain
    pub ki_maintain: f64,
    /// Hold derivative gain
    pub kd_maintain: f64,
    /// Folder for run logs and the checkpoint
    pub saved_run_folder: PathBuf,
    /// Folder for program definitions
    pub program_folder: PathBuf,
    /// Target of the test ramp program
    pub test_ramp_temperature: f64,
    /// Duration of the test ramp program
    pub test_ramp_minutes: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let base = default_data_dir();
        Self {
            step_time: 1.0,
            step_save: 30.0,
            kp_ramp: 0.9,
            ki_ramp: 0.001,
            kd_ramp: 0.001,
            kp_maintain: 0.01,
            ki_maintain: 0.0001,
            kd_maintain: 0.0001,
            saved_run_folder: base.join("runs"),
            program_folder: base.join("programs"),
            test_ramp_temperature: 100.0,
            test_ramp_minutes: 10.0,
        }
    }
}

impl ControllerSettings {
    /// Control period
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(self.step_time)
    }

    /// Gains used while ramping
    pub fn ramp_gains(&self) -> PidGains {
        PidGains::new(self.kp_ramp, self.ki_ramp, self.kd_ramp)
    }

    /// Gains used while holding
    pub fn maintain_gains(&self) -> PidGains {
        PidGains::new(self.kp_maintain, self.ki_maintain, self.kd_maintain)
    }

    /// Check the settings can drive a control loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step_time.is_finite() && self.step_time > 0.0) {
            return Err(ConfigError::Invalid {
                field: "step-time",
                reason: format!("must be positive, got {}", self.step_time),
            });
        }
        if !(self.step_save.is_finite() && self.step_save >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "step-save",
                reason: format!("must not be negative, got {}", self.step_save),
            });
        }
        let gains = [
            ("kp-ramp", self.kp_ramp),
            ("ki-ramp", self.ki_ramp),
            ("kd-ramp", self.kd_ramp),
            ("kp-maintain", self.kp_maintain),
            ("ki-maintain", self.ki_maintain),
            ("kd-maintain", self.kd_maintain),
        ];
        for (field, value) in gains {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("gain must not be negative, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OvenControlConfig {
    /// Control loop settings
    pub controller: ControllerSettings,
    /// Simulated oven model
    pub oven: OvenModel,
}

impl OvenControlConfig {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.json")
    }

    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::info!(
                "No configuration at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        self.oven.validate().map_err(|reason| ConfigError::Invalid {
            field: "oven",
            reason,
        })
    }
}

/// Application data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ovenctl")
}
