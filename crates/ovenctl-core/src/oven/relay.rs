//! Relay-driven oven
//!
//! Drives a real oven through three small hardware abstractions: a
//! thermocouple reader, a solid-state power regulator, and on/off relays for
//! the "working" light, the heating contactor and the vent.

use std::sync::{Arc, Mutex, PoisonError};

use super::{Oven, OvenError, SensorError, VentTimer};

/// Trait for temperature sensors (thermocouple amplifiers and the like)
pub trait TemperatureSensor: Send {
    /// Read the current temperature in degrees Celsius
    fn read_celsius(&mut self) -> Result<f64, SensorError>;
}

/// Trait for the heating power regulator
pub trait PowerRegulator: Send {
    /// Set the duty cycle, 0 = off, 255 = full power
    fn set_duty(&mut self, duty: u8) -> Result<(), OvenError>;
}

/// Trait for an on/off output
pub trait Relay: Send {
    /// Switch the output
    fn set_on(&mut self, on: bool) -> Result<(), OvenError>;

    /// Current state of the output
    fn is_on(&self) -> bool;
}

/// The relays an oven is wired with
pub struct RelaySet<R> {
    /// Front panel light shown while a program runs
    pub working_light: R,
    /// Heating contactor
    pub main_power: R,
    /// Vent direction: on opens, off closes
    pub vent_direction: R,
    /// Vent compressor, powered only while the vent moves
    pub vent_compressor: R,
}

/// Oven driven by relays and a power regulator
pub struct RelayOven<S, P, R> {
    sensor: S,
    regulator: P,
    working_light: R,
    main_power: R,
    vent_direction: R,
    vent_compressor: Arc<Mutex<R>>,
    vent_timer: VentTimer,
    fraction: f64,
    max_power: f64,
}

impl<S, P, R> RelayOven<S, P, R>
where
    S: TemperatureSensor,
    P: PowerRegulator,
    R: Relay + 'static,
{
    /// Create an oven with the default vent timer
    pub fn new(sensor: S, regulator: P, relays: RelaySet<R>, max_power: f64) -> Self {
        Self {
            sensor,
            regulator,
            working_light: relays.working_light,
            main_power: relays.main_power,
            vent_direction: relays.vent_direction,
            vent_compressor: Arc::new(Mutex::new(relays.vent_compressor)),
            vent_timer: VentTimer::default(),
            fraction: 0.0,
            max_power,
        }
    }

    /// Use a different vent follow-up timer
    pub fn with_vent_timer(mut self, timer: VentTimer) -> Self {
        self.vent_timer = timer;
        self
    }

    fn move_vent(&mut self, open: bool) -> Result<(), OvenError> {
        self.vent_direction.set_on(open)?;
        self.vent_compressor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_on(true)?;

        let compressor = self.vent_compressor.clone();
        self.vent_timer.schedule(move || {
            let mut relay = compressor.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = relay.set_on(false) {
                tracing::error!("Failed to stop vent compressor: {e}");
            }
        })
    }
}

/// Duty cycle for a power fraction
fn duty_for(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl<S, P, R> Oven for RelayOven<S, P, R>
where
    S: TemperatureSensor,
    P: PowerRegulator,
    R: Relay + 'static,
{
    fn temperature(&mut self) -> Result<f64, OvenError> {
        Ok(self.sensor.read_celsius()?)
    }

    fn percentual(&self) -> f64 {
        self.fraction
    }

    fn max_power(&self) -> f64 {
        self.max_power
    }

    fn set_percentual(&mut self, fraction: f64) -> Result<(), OvenError> {
        self.fraction = fraction;
        self.regulator.set_duty(duty_for(fraction))
    }

    fn init_start_program(&mut self) -> Result<(), OvenError> {
        tracing::info!("Init start program");
        if let Err(e) = self.working_light.set_on(true) {
            let _ = self.working_light.set_on(false);
            return Err(e);
        }
        if let Err(e) = self.main_power.set_on(true) {
            let _ = self.main_power.set_on(false);
            let _ = self.working_light.set_on(false);
            return Err(e);
        }
        Ok(())
    }

    fn end_program(&mut self) -> Result<(), OvenError> {
        tracing::info!("End program");
        // The contactor goes off even if the light fails
        let light = self.working_light.set_on(false);
        let power = self.main_power.set_on(false);
        light.and(power)
    }

    fn open_air(&mut self) -> Result<(), OvenError> {
        self.move_vent(true)
    }

    fn close_air(&mut self) -> Result<(), OvenError> {
        self.move_vent(false)
    }
}
