//! Oven Programs
//!
//! A program is an ordered list of segments, each with a target temperature
//! and a duration. The segment order is the execution order.

mod store;

pub use store::{FolderProgramStore, ProgramCatalog, StoreError};

use serde::{Deserialize, Serialize};

/// Name given to programs built by [`Program::test_ramp`]
pub const TEST_PROGRAM_NAME: &str = "TestProgram";

/// A named temperature program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Unique name, also the catalog key
    pub name: String,
    /// Display color for the frontend
    #[serde(rename = "icon-color", default)]
    pub icon_color: String,
    /// Segments in execution order
    pub points: Vec<Segment>,
    /// Temperature at which the vent is closed during an ascending ramp.
    /// Zero or negative closes the vent as soon as the run starts.
    #[serde(rename = "air-closed-at-degrees", default, with = "quoted")]
    pub air_close_at_degrees: f64,
}

/// One step of a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment name, recorded in samples and in the checkpoint
    #[serde(rename = "segment-name")]
    pub segment_name: String,
    /// Target temperature in °C
    #[serde(rename = "temperature", with = "quoted")]
    pub target_temperature: f64,
    /// Ramp or hold duration in minutes
    #[serde(rename = "time-minutes", with = "quoted")]
    pub duration_minutes: f64,
    /// Whether an interrupted run may resume from this segment
    #[serde(rename = "restart-from-last-ascending-ramp", default)]
    pub restart_from_last_ascending_ramp: bool,
    /// How long after the last recorded sample a resume is still allowed
    #[serde(rename = "time-after-no-restart-minutes", default, with = "quoted")]
    pub time_after_no_restart_minutes: f64,
}

impl Segment {
    /// Create a segment that does not allow resuming
    pub fn new(name: impl Into<String>, target_temperature: f64, duration_minutes: f64) -> Self {
        Self {
            segment_name: name.into(),
            target_temperature,
            duration_minutes,
            restart_from_last_ascending_ramp: false,
            time_after_no_restart_minutes: 0.0,
        }
    }

    /// Allow resuming from this segment within `tolerance_minutes` of the
    /// last recorded sample
    pub fn with_restart(mut self, tolerance_minutes: f64) -> Self {
        self.restart_from_last_ascending_ramp = true;
        self.time_after_no_restart_minutes = tolerance_minutes;
        self
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_minutes * 60.0
    }
}

impl Program {
    /// Create a program with the vent threshold disabled
    pub fn new(name: impl Into<String>, points: Vec<Segment>) -> Self {
        Self {
            name: name.into(),
            icon_color: String::new(),
            points,
            air_close_at_degrees: 0.0,
        }
    }

    /// Single ramp used to check the oven response
    pub fn test_ramp(temperature: f64, minutes: f64) -> Self {
        Self::new(
            TEST_PROGRAM_NAME,
            vec![Segment::new("Test ramp", temperature, minutes)],
        )
    }

    /// Index of the first segment with the given name
    pub fn segment_index(&self, segment_name: &str) -> Option<usize> {
        self.points
            .iter()
            .position(|s| s.segment_name == segment_name)
    }

    /// Copy of this program starting at segment `index`
    pub fn resumed_from(&self, index: usize) -> Self {
        Self {
            name: self.name.clone(),
            icon_color: self.icon_color.clone(),
            points: self.points.get(index..).unwrap_or_default().to_vec(),
            air_close_at_degrees: self.air_close_at_degrees,
        }
    }
}

/// Numbers stored as JSON strings, read back from either strings or numbers
mod quoted {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(v) => Ok(v),
            NumberOrString::String(s) if s.trim().is_empty() => Ok(0.0),
            NumberOrString::String(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}
