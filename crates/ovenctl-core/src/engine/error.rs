//! Engine errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::oven::OvenError;
use crate::telemetry::TelemetryError;

/// Errors returned by the execution engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Oven is busy with another run")]
    Busy,

    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error(transparent)]
    Oven(#[from] OvenError),

    #[error("Run storage error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
