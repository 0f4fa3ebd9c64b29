//! Simulated oven
//!
//! Lumped thermal model of an insulated box: the heating elements deliver
//! `fraction × max_power` watts, the walls conduct heat out towards the
//! ambient temperature, and the load heats up according to its mass and
//! specific heat. Time runs `time_multiplier` times faster than the clock so
//! a full firing can be watched in minutes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{Oven, OvenError, SensorError, VentTimer};

/// Longest simulated interval integrated in one step, in seconds
const MAX_INTEGRATION_STEP: f64 = 1.0;

/// Physical description of the simulated oven
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OvenModel {
    /// Inner length in meters
    pub length: f64,
    /// Inner height in meters
    pub height: f64,
    /// Inner width in meters
    pub width: f64,
    /// Insulation layer thicknesses in meters, inside to outside
    pub insulation_widths: Vec<f64>,
    /// Thermal conductivity of each insulation layer in W/(m·K)
    pub thermal_conductivities: Vec<f64>,
    /// Specific heat of the load in J/(kg·K)
    pub thermal_capacity: f64,
    /// Mass of the load in kg
    pub weight: f64,
    /// Heating power at 100 % in W
    pub max_power: f64,
    /// Temperature outside the oven in °C
    pub ambient_temperature: f64,
    /// Simulated seconds per real second
    pub time_multiplier: f64,
    /// Amplitude of uniform noise added to readings, in °C
    pub sensor_noise: f64,
}

impl Default for OvenModel {
    fn default() -> Self {
        Self {
            length: 0.5,
            height: 0.5,
            width: 0.5,
            insulation_widths: vec![0.065, 0.05],
            thermal_conductivities: vec![0.25, 0.1],
            thermal_capacity: 900.0,
            weight: 80.0,
            max_power: 6000.0,
            ambient_temperature: 25.0,
            time_multiplier: 10.0,
            sensor_noise: 0.0,
        }
    }
}

impl OvenModel {
    /// Inner wall surface in m²
    pub fn internal_area(&self) -> f64 {
        2.0 * (self.length * self.height + self.length * self.width + self.height * self.width)
    }

    /// Total insulation thickness in meters
    pub fn insulation_width(&self) -> f64 {
        self.insulation_widths.iter().sum()
    }

    /// Equivalent conductivity of the layered insulation.
    ///
    /// Layers are thermal resistances in series.
    pub fn effective_conductivity(&self) -> f64 {
        let resistance: f64 = self
            .insulation_widths
            .iter()
            .zip(&self.thermal_conductivities)
            .map(|(w, k)| w / k)
            .sum();
        if resistance > 0.0 {
            self.insulation_width() / resistance
        } else {
            0.0
        }
    }

    /// Heat lost through the walls at `temperature`, in W
    pub fn heat_loss(&self, temperature: f64) -> f64 {
        let width = self.insulation_width();
        if width <= 0.0 {
            return 0.0;
        }
        self.effective_conductivity() * self.internal_area() * (temperature - self.ambient_temperature)
            / width
    }

    /// Temperature change over `seconds` at constant input `power` watts
    pub fn temperature_change(&self, temperature: f64, power: f64, seconds: f64) -> f64 {
        let heat_mass = self.weight * self.thermal_capacity;
        if heat_mass <= 0.0 {
            return 0.0;
        }
        (power - self.heat_loss(temperature)) / heat_mass * seconds
    }

    /// Check the model is physically meaningful
    pub fn validate(&self) -> Result<(), String> {
        if self.weight <= 0.0 || self.thermal_capacity <= 0.0 {
            return Err("weight and thermal-capacity must be positive".into());
        }
        if self.insulation_widths.len() != self.thermal_conductivities.len() {
            return Err("insulation-widths and thermal-conductivities differ in length".into());
        }
        if self.insulation_widths.is_empty()
            || self.insulation_widths.iter().any(|w| *w <= 0.0)
            || self.thermal_conductivities.iter().any(|k| *k <= 0.0)
        {
            return Err("insulation layers need positive width and conductivity".into());
        }
        if self.max_power <= 0.0 || self.time_multiplier <= 0.0 {
            return Err("max-power and time-multiplier must be positive".into());
        }
        Ok(())
    }
}

/// Oven backed by [`OvenModel`]
pub struct SimulatedOven {
    model: OvenModel,
    temperature: f64,
    fraction: f64,
    /// Heating relay, on between init_start_program and end_program
    heating: bool,
    last_update: Option<Instant>,
    vent_open: bool,
    compressor_running: Arc<AtomicBool>,
    vent_timer: VentTimer,
    sensor_fault: Option<SensorError>,
    rng: StdRng,
}

impl SimulatedOven {
    /// Create an oven at ambient temperature
    pub fn new(model: OvenModel) -> Self {
        Self::with_rng(model, StdRng::from_entropy())
    }

    /// Create an oven with deterministic sensor noise
    pub fn with_seed(model: OvenModel, seed: u64) -> Self {
        Self::with_rng(model, StdRng::seed_from_u64(seed))
    }

    fn with_rng(model: OvenModel, rng: StdRng) -> Self {
        Self {
            temperature: model.ambient_temperature,
            model,
            fraction: 0.0,
            heating: false,
            last_update: None,
            vent_open: true,
            compressor_running: Arc::new(AtomicBool::new(false)),
            vent_timer: VentTimer::default(),
            sensor_fault: None,
            rng,
        }
    }

    /// Use a different vent follow-up timer
    pub fn with_vent_timer(mut self, timer: VentTimer) -> Self {
        self.vent_timer = timer;
        self
    }

    /// Start from a given temperature instead of ambient
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// The thermal model
    pub fn model(&self) -> &OvenModel {
        &self.model
    }

    /// Make subsequent readings fail with `fault`, or clear it with `None`
    pub fn set_sensor_fault(&mut self, fault: Option<SensorError>) {
        self.sensor_fault = fault;
    }

    /// Whether the vent is open
    pub fn is_vent_open(&self) -> bool {
        self.vent_open
    }

    /// Whether the vent compressor is still moving the vent
    pub fn is_compressor_running(&self) -> bool {
        self.compressor_running.load(Ordering::SeqCst)
    }

    /// Whether the heating relay is on
    pub fn is_heating_enabled(&self) -> bool {
        self.heating
    }

    /// Model temperature without noise, advanced to now
    pub fn true_temperature(&mut self) -> f64 {
        self.advance();
        self.temperature
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let Some(last) = self.last_update.replace(now) else {
            return;
        };

        let mut remaining = now.duration_since(last).as_secs_f64() * self.model.time_multiplier;
        let power = if self.heating {
            self.fraction * self.model.max_power
        } else {
            0.0
        };

        while remaining > 0.0 {
            let step = remaining.min(MAX_INTEGRATION_STEP);
            self.temperature += self.model.temperature_change(self.temperature, power, step);
            remaining -= step;
        }
    }

    fn move_vent(&mut self, open: bool) -> Result<(), OvenError> {
        self.vent_open = open;
        self.compressor_running.store(true, Ordering::SeqCst);
        let compressor = self.compressor_running.clone();
        self.vent_timer
            .schedule(move || compressor.store(false, Ordering::SeqCst))
    }
}

impl Oven for SimulatedOven {
    fn temperature(&mut self) -> Result<f64, OvenError> {
        self.advance();
        if let Some(fault) = self.sensor_fault {
            return Err(fault.into());
        }
        let noise = if self.model.sensor_noise > 0.0 {
            self.rng
                .gen_range(-self.model.sensor_noise..=self.model.sensor_noise)
        } else {
            0.0
        };
        Ok(((self.temperature + noise) * 100.0).round() / 100.0)
    }

    fn percentual(&self) -> f64 {
        self.fraction
    }

    fn max_power(&self) -> f64 {
        self.model.max_power
    }

    fn set_percentual(&mut self, fraction: f64) -> Result<(), OvenError> {
        self.advance();
        self.fraction = fraction;
        Ok(())
    }

    fn init_start_program(&mut self) -> Result<(), OvenError> {
        self.advance();
        tracing::info!("Simulated oven: heating enabled");
        self.heating = true;
        Ok(())
    }

    fn end_program(&mut self) -> Result<(), OvenError> {
        self.advance();
        tracing::info!("Simulated oven: heating disabled");
        self.heating = false;
        Ok(())
    }

    fn open_air(&mut self) -> Result<(), OvenError> {
        self.move_vent(true)
    }

    fn close_air(&mut self) -> Result<(), OvenError> {
        self.move_vent(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_model_defaults_are_valid() {
        let model = OvenModel::default();
        assert!(model.validate().is_ok());
        assert!((model.internal_area() - 1.5).abs() < 1e-9);
        assert!(model.effective_conductivity() > 0.1);
        assert!(model.effective_conductivity() < 0.25);
        assert_eq!(model.heat_loss(model.ambient_temperature), 0.0);
    }

    #[test]
    fn test_model_validation() {
        let model = OvenModel {
            thermal_conductivities: vec![0.1],
            ..OvenModel::default()
        };
        assert!(model.validate().is_err());

        let model = OvenModel {
            weight: 0.0,
            ..OvenModel::default()
        };
        assert!(model.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heats_only_when_enabled() {
        let mut oven = SimulatedOven::with_seed(OvenModel::default(), 7);
        let start = oven.temperature().unwrap();

        oven.set_percentual(1.0).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        let idle = oven.temperature().unwrap();
        assert!((idle - start).abs() < 0.01, "heated without relay: {idle}");

        oven.init_start_program().unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        let heated = oven.temperature().unwrap();
        assert!(heated > start + 10.0, "expected heating, got {heated}");

        oven.end_program().unwrap();
        let before_cooling = oven.true_temperature();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(oven.true_temperature() < before_cooling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vent_compressor_stops() {
        let mut oven = SimulatedOven::new(OvenModel::default())
            .with_vent_timer(VentTimer::new(Duration::from_secs(10)));
        assert!(oven.is_vent_open());

        oven.close_air().unwrap();
        assert!(!oven.is_vent_open());
        assert!(oven.is_compressor_running());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!oven.is_compressor_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_fault() {
        let mut oven = SimulatedOven::new(OvenModel::default());
        oven.set_sensor_fault(Some(SensorError::OpenCircuit));
        assert_eq!(
            oven.temperature(),
            Err(OvenError::Sensor(SensorError::OpenCircuit))
        );
        oven.set_sensor_fault(None);
        assert!(oven.temperature().is_ok());
    }
}
