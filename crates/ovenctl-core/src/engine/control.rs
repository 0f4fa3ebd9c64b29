//! PID control strategies
//!
//! Ramps track a trajectory: the error is the difference between the
//! temperature change the ramp asked for during the last tick and the change
//! that actually happened, and the PID output is added to the power already
//! applied. Holds track a setpoint: the error is the distance from the
//! target and the PID output is the power itself.

use serde::{Deserialize, Serialize};

/// PID coefficients
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain (Kp)
    pub kp: f64,
    /// Integral gain (Ki)
    pub ki: f64,
    /// Derivative gain (Kd)
    pub kd: f64,
}

impl PidGains {
    /// Create gains
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Clamp a controller output to a valid power fraction
pub fn clamp_power(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Integral and derivative memory
#[derive(Debug, Clone, Default)]
struct PidState {
    integral: f64,
    previous_error: Option<f64>,
    derivative: f64,
}

impl PidState {
    fn seeded(previous_error: f64) -> Self {
        Self {
            previous_error: Some(previous_error),
            ..Self::default()
        }
    }

    /// Raw PID term for `error` observed `delta` seconds after the last one.
    ///
    /// The first call without a seeded previous error has no derivative.
    /// A zero `delta` keeps the previous derivative.
    fn step(&mut self, gains: &PidGains, error: f64, delta: f64) -> f64 {
        let previous = self.previous_error.unwrap_or(error);
        self.integral += error * delta;
        if delta > 0.0 {
            self.derivative = (error - previous) / delta;
        }
        self.previous_error = Some(error);
        gains.kp * error + gains.ki * self.integral + gains.kd * self.derivative
    }
}

/// Trajectory-tracking controller for one ramp segment
#[derive(Debug, Clone)]
pub struct RampController {
    gains: PidGains,
    pid: PidState,
    target: f64,
    ascending: bool,
    /// °C per second, `None` for a zero-length ramp
    rate: Option<f64>,
    desired: f64,
    last_temperature: f64,
}

impl RampController {
    /// Ramp from `start_temperature` to `target` over `duration_seconds`
    pub fn new(gains: PidGains, start_temperature: f64, target: f64, duration_seconds: f64) -> Self {
        let rate = (duration_seconds > 0.0).then(|| (target - start_temperature) / duration_seconds);
        Self {
            gains,
            pid: PidState::seeded(0.0),
            target,
            ascending: target >= start_temperature,
            rate,
            desired: if rate.is_some() { start_temperature } else { target },
            last_temperature: start_temperature,
        }
    }

    /// Temperature the trajectory is currently at
    pub fn desired(&self) -> f64 {
        self.desired
    }

    /// Ramp rate in °C per second, `None` when the ramp has no duration
    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Advance the trajectory by `delta` seconds and compute the new power
    /// from the `measured` temperature and the power applied so far.
    pub fn update(&mut self, measured: f64, delta: f64, previous_power: f64) -> f64 {
        let actual_change = measured - self.last_temperature;
        self.last_temperature = measured;

        let Some(rate) = self.rate else {
            // No time allowed: go flat out towards the target
            return if self.ascending { 1.0 } else { 0.0 };
        };

        let expected_change = rate * delta;
        self.desired = if self.ascending {
            (self.desired + expected_change).min(self.target)
        } else {
            (self.desired + expected_change).max(self.target)
        };

        let error = expected_change - actual_change;
        clamp_power(previous_power + self.pid.step(&self.gains, error, delta))
    }
}

/// Setpoint-tracking controller for one hold segment
#[derive(Debug, Clone)]
pub struct HoldController {
    gains: PidGains,
    pid: PidState,
    target: f64,
}

impl HoldController {
    /// Hold at `target`
    pub fn new(gains: PidGains, target: f64) -> Self {
        Self {
            gains,
            pid: PidState::default(),
            target,
        }
    }

    /// Power for the `measured` temperature, `delta` seconds after the
    /// previous update
    pub fn update(&mut self, measured: f64, delta: f64) -> f64 {
        clamp_power(self.pid.step(&self.gains, self.target - measured, delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GAINS: PidGains = PidGains::new(0.9, 0.001, 0.001);

    #[test]
    fn test_ramp_tracks_trajectory() {
        // 25 → 205 over 180 s: one degree per second
        let mut ramp = RampController::new(GAINS, 25.0, 205.0, 180.0);
        assert_eq!(ramp.rate(), Some(1.0));

        // Oven heated exactly as planned: no error, power unchanged
        let power = ramp.update(26.0, 1.0, 0.4);
        assert!((power - 0.4).abs() < 1e-9);
        assert_eq!(ramp.desired(), 26.0);

        // Oven lagging: power goes up
        let power = ramp.update(26.2, 1.0, 0.4);
        assert!(power > 0.4);
        assert_eq!(ramp.desired(), 27.0);
    }

    #[test]
    fn test_ramp_output_is_additive() {
        let mut ramp = RampController::new(PidGains::new(0.1, 0.0, 0.0), 0.0, 100.0, 100.0);
        // Expected +1, actual 0: error 1, adds 0.1 on top of previous power
        let power = ramp.update(0.0, 1.0, 0.5);
        assert!((power - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_ramp_down_overshooting_cuts_power() {
        let mut ramp = RampController::new(GAINS, 500.0, 400.0, 100.0);
        // Expected −1, actual −0.2: cooling too slowly
        let power = ramp.update(499.8, 1.0, 0.3);
        assert!(power < 0.3);
        assert_eq!(ramp.desired(), 499.0);
    }

    #[test]
    fn test_zero_duration_ramp() {
        let mut up = RampController::new(GAINS, 20.0, 100.0, 0.0);
        assert_eq!(up.desired(), 100.0);
        assert_eq!(up.update(21.0, 1.0, 0.0), 1.0);

        let mut down = RampController::new(GAINS, 100.0, 20.0, 0.0);
        assert_eq!(down.update(99.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_zero_delta_has_no_division() {
        let mut ramp = RampController::new(GAINS, 20.0, 100.0, 60.0);
        let power = ramp.update(20.0, 0.0, 0.5);
        assert!(power.is_finite());

        let mut hold = HoldController::new(GAINS, 100.0);
        assert!(hold.update(90.0, 0.0).is_finite());
    }

    #[test]
    fn test_hold_output_is_absolute() {
        let mut hold = HoldController::new(PidGains::new(0.01, 0.0, 0.0), 100.0);
        assert!((hold.update(90.0, 1.0) - 0.1).abs() < 1e-9);
        // Same error, same power: nothing accumulates without Ki
        assert!((hold.update(90.0, 1.0) - 0.1).abs() < 1e-9);
        assert_eq!(hold.update(150.0, 1.0), 0.0);
    }

    #[test]
    fn test_hold_first_update_has_no_derivative_kick() {
        let mut hold = HoldController::new(PidGains::new(0.0, 0.0, 1.0), 100.0);
        assert_eq!(hold.update(50.0, 1.0), 0.0);
    }

    #[test]
    fn test_clamp_nan() {
        assert_eq!(clamp_power(f64::NAN), 0.0);
        assert_eq!(clamp_power(f64::INFINITY), 1.0);
        assert_eq!(clamp_power(f64::NEG_INFINITY), 0.0);
    }

    proptest! {
        #[test]
        fn prop_ramp_power_in_range(
            start in -50.0f64..1500.0,
            target in -50.0f64..1500.0,
            duration in 0.0f64..100_000.0,
            kp in 0.0f64..1e6,
            ki in 0.0f64..1e6,
            kd in 0.0f64..1e6,
            readings in proptest::collection::vec((-1e6f64..1e6, 0.0f64..100.0), 1..50),
            previous in -10.0f64..10.0,
        ) {
            let mut ramp = RampController::new(PidGains::new(kp, ki, kd), start, target, duration);
            let mut power = previous;
            for (measured, delta) in readings {
                power = ramp.update(measured, delta, power);
                prop_assert!((0.0..=1.0).contains(&power));
                if target >= start {
                    prop_assert!(ramp.desired() <= target);
                } else {
                    prop_assert!(ramp.desired() >= target);
                }
            }
        }

        #[test]
        fn prop_hold_power_in_range(
            target in -50.0f64..1500.0,
            kp in 0.0f64..1e6,
            ki in 0.0f64..1e6,
            kd in 0.0f64..1e6,
            readings in proptest::collection::vec((-1e6f64..1e6, 0.0f64..100.0), 1..50),
        ) {
            let mut hold = HoldController::new(PidGains::new(kp, ki, kd), target);
            for (measured, delta) in readings {
                let power = hold.update(measured, delta);
                prop_assert!((0.0..=1.0).contains(&power));
            }
        }
    }
}
