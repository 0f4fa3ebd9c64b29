//! Oven Capability
//!
//! The narrow interface the engine uses to measure and actuate the oven,
//! with a simulated implementation and one driving relays and a power
//! regulator.
//!
//! All calls are synchronous and expected to be fast compared with the
//! control period. Vent movements are fire-and-forget: the implementation
//! schedules its own follow-up (stopping the vent compressor) on a
//! [`VentTimer`].

mod relay;
mod simulated;
mod vent;

pub use relay::{PowerRegulator, Relay, RelayOven, RelaySet, TemperatureSensor};
pub use simulated::{OvenModel, SimulatedOven};
pub use vent::{VentTimer, DEFAULT_VENT_ACTION_DELAY};

use thiserror::Error;

/// Errors that can occur with temperature sensing
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor disconnected")]
    OpenCircuit,

    #[error("sensor shorted")]
    ShortCircuit,

    #[error("reading out of range")]
    OutOfRange,

    #[error("conversion failed")]
    ConversionError,
}

/// Errors reported by an oven implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OvenError {
    #[error("Temperature sensor fault: {0}")]
    Sensor(#[from] SensorError),

    #[error("Actuator fault: {0}")]
    Actuator(String),
}

/// Measurement and actuation primitives of an oven
pub trait Oven: Send {
    /// Current oven temperature in °C
    fn temperature(&mut self) -> Result<f64, OvenError>;

    /// Last power fraction written with [`Oven::set_percentual`]
    fn percentual(&self) -> f64;

    /// Heating power at 100 %, in watts
    fn max_power(&self) -> f64;

    /// Set the heating power fraction. The caller clamps to `[0, 1]`.
    fn set_percentual(&mut self, fraction: f64) -> Result<(), OvenError>;

    /// Enable actuation at the start of a run
    fn init_start_program(&mut self) -> Result<(), OvenError>;

    /// Disable actuation at the end of a run
    fn end_program(&mut self) -> Result<(), OvenError>;

    /// Open the vent
    fn open_air(&mut self) -> Result<(), OvenError>;

    /// Close the vent
    fn close_air(&mut self) -> Result<(), OvenError>;
}

impl<O: Oven + ?Sized> Oven for Box<O> {
    fn temperature(&mut self) -> Result<f64, OvenError> {
        (**self).temperature()
    }

    fn percentual(&self) -> f64 {
        (**self).percentual()
    }

    fn max_power(&self) -> f64 {
        (**self).max_power()
    }

    fn set_percentual(&mut self, fraction: f64) -> Result<(), OvenError> {
        (**self).set_percentual(fraction)
    }

    fn init_start_program(&mut self) -> Result<(), OvenError> {
        (**self).init_start_program()
    }

    fn end_program(&mut self) -> Result<(), OvenError> {
        (**self).end_program()
    }

    fn open_air(&mut self) -> Result<(), OvenError> {
        (**self).open_air()
    }

    fn close_air(&mut self) -> Result<(), OvenError> {
        (**self).close_air()
    }
}
