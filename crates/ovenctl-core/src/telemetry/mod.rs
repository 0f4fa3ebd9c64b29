//! Run Telemetry
//!
//! Samples recorded while a program runs: kept in memory for live status
//! queries and appended to a per-run CSV log that survives restarts.

mod recorder;
mod run_log;

pub use recorder::TelemetryRecorder;
pub use run_log::{archive_runs, list_runs, RunLog, TelemetryError, RUN_LOG_HEADER};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used in run logs
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One telemetry point of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Sample {
    /// Program being run
    pub program_name: String,
    /// Segment being run
    pub segment_name: String,
    /// Run time when the sample was taken
    pub seconds_from_start: f64,
    /// Local wall-clock time, whole seconds
    #[serde(rename = "datetime")]
    pub timestamp: NaiveDateTime,
    /// Temperature the program asked for
    pub desired_temperature: f64,
    /// Temperature read from the oven
    #[serde(rename = "oven-temperature")]
    pub measured_temperature: f64,
    /// Heating power fraction in `[0, 1]`
    #[serde(rename = "oven-percentage")]
    pub power_fraction: f64,
    /// Whether the vent was closed
    #[serde(rename = "air-closed")]
    pub vent_closed: bool,
}

impl Sample {
    /// Round to the stored precision: hundredths for times and
    /// temperatures, four decimals for power
    pub fn rounded(mut self) -> Self {
        self.seconds_from_start = round_to(self.seconds_from_start, 2);
        self.desired_temperature = round_to(self.desired_temperature, 2);
        self.measured_temperature = round_to(self.measured_temperature, 2);
        self.power_fraction = round_to(self.power_fraction, 4);
        self
    }
}

/// Round `value` to `decimals` decimal places
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_at(seconds: f64, timestamp: &str) -> Sample {
        Sample {
            program_name: "Bisque".into(),
            segment_name: "Warm".into(),
            seconds_from_start: seconds,
            timestamp: NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).unwrap(),
            desired_temperature: 100.0,
            measured_temperature: 99.5,
            power_fraction: 0.5,
            vent_closed: false,
        }
    }

    #[test]
    fn test_rounding() {
        let sample = Sample {
            seconds_from_start: 12.3456,
            desired_temperature: 101.239,
            measured_temperature: 99.994,
            power_fraction: 0.123456,
            ..sample_at(0.0, "2024-03-01T10:00:00")
        }
        .rounded();

        assert_eq!(sample.seconds_from_start, 12.35);
        assert_eq!(sample.desired_temperature, 101.24);
        assert_eq!(sample.measured_temperature, 99.99);
        assert_eq!(sample.power_fraction, 0.1235);
    }
}
