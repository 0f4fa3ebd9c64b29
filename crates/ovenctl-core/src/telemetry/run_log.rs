//! Run log files
//!
//! One CSV file per run, named after the run. The header is written when the
//! file is created; after that rows are only ever appended.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use super::{Sample, TIMESTAMP_FORMAT};

/// Column titles of a run log
pub const RUN_LOG_HEADER: [&str; 8] = [
    "Program name",
    "Segment name",
    "Seconds from start",
    "Datetime",
    "Target temperature",
    "Oven temperature",
    "Power percentage",
    "Air closed",
];

/// File extension of run logs
const RUN_LOG_EXTENSION: &str = "csv";

/// Errors reading or writing run logs
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed run log row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

/// Append-only CSV log of one run
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Path of the log for `run_name` inside `folder`
    pub fn path_for(folder: &Path, run_name: &str) -> PathBuf {
        folder.join(format!("{run_name}.{RUN_LOG_EXTENSION}"))
    }

    /// Open the log for appending, creating it with a header if it does not
    /// exist yet. An existing log keeps its rows and gets no second header.
    pub fn create(folder: &Path, run_name: &str) -> Result<Self, TelemetryError> {
        fs::create_dir_all(folder)?;
        let path = Self::path_for(folder, run_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(RUN_LOG_HEADER)?;
            writer.flush()?;
        }

        Ok(Self { path })
    }

    /// Refer to an existing log without touching it
    pub fn existing(folder: &Path, run_name: &str) -> Self {
        Self {
            path: Self::path_for(folder, run_name),
        }
    }

    /// Location of the log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows for `samples`
    pub fn append(&self, samples: &[Sample]) -> Result<(), TelemetryError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for sample in samples {
            writer.write_record(to_record(sample))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read every sample back
    pub fn read(&self) -> Result<Vec<Sample>, TelemetryError> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file);

        let mut samples = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            samples.push(from_record(&record).map_err(|reason| TelemetryError::Malformed {
                row: idx + 1,
                reason,
            })?);
        }
        Ok(samples)
    }
}

fn to_record(sample: &Sample) -> [String; 8] {
    [
        sample.program_name.clone(),
        sample.segment_name.clone(),
        format!("{:.1}", sample.seconds_from_start),
        sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        format!("{:.1}", sample.desired_temperature),
        format!("{:.1}", sample.measured_temperature),
        format!("{:.2}", sample.power_fraction),
        if sample.vent_closed { "1" } else { "0" }.to_string(),
    ]
}

fn from_record(record: &csv::StringRecord) -> Result<Sample, String> {
    if record.len() != RUN_LOG_HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            RUN_LOG_HEADER.len(),
            record.len()
        ));
    }

    let number = |idx: usize| -> Result<f64, String> {
        record[idx]
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("{}: {e}", RUN_LOG_HEADER[idx]))
    };

    let timestamp = NaiveDateTime::parse_from_str(record[3].trim(), TIMESTAMP_FORMAT)
        .map_err(|e| format!("{}: {e}", RUN_LOG_HEADER[3]))?;

    Ok(Sample {
        program_name: record[0].to_string(),
        segment_name: record[1].to_string(),
        seconds_from_start: number(2)?,
        timestamp,
        desired_temperature: number(4)?,
        measured_temperature: number(5)?,
        power_fraction: number(6)?,
        vent_closed: record[7].trim() == "1",
    })
}

/// File names of all run logs in `folder`, sorted
pub fn list_runs(folder: &Path) -> Result<Vec<String>, TelemetryError> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(RUN_LOG_EXTENSION) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                runs.push(name.to_string());
            }
        }
    }
    runs.sort();
    Ok(runs)
}

/// Move every run log from `folder` into `destination`, except the log of
/// `active_run`. Returns the moved file names.
pub fn archive_runs(
    folder: &Path,
    destination: &Path,
    active_run: Option<&str>,
) -> Result<Vec<String>, TelemetryError> {
    fs::create_dir_all(destination)?;
    let active = active_run.map(|run| format!("{run}.{RUN_LOG_EXTENSION}"));

    let mut moved = Vec::new();
    for name in list_runs(folder)? {
        if active.as_deref() == Some(name.as_str()) {
            continue;
        }
        let source = folder.join(&name);
        let target = destination.join(&name);
        if fs::rename(&source, &target).is_err() {
            // Different filesystem, e.g. a USB stick
            fs::copy(&source, &target)?;
            fs::remove_file(&source)?;
        }
        tracing::info!("Archived run log {name} to {}", destination.display());
        moved.push(name);
    }
    Ok(moved)
}
