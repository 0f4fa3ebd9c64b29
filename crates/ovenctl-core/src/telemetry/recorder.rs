//! In-memory telemetry buffer
//!
//! Append-only list of the current run's samples, with a marker for how far
//! it has been written to the run log.

use super::{RunLog, Sample, TelemetryError};

/// Samples of the current run
#[derive(Debug, Default)]
pub struct TelemetryRecorder {
    samples: Vec<Sample>,
    /// Number of samples already written to the run log
    flushed: usize,
}

impl TelemetryRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
        self.flushed = 0;
    }

    /// Replace the contents with samples already on disk
    pub fn restore(&mut self, samples: Vec<Sample>) {
        self.flushed = samples.len();
        self.samples = samples;
    }

    /// Append a sample
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Samples not yet written to the run log
    pub fn unflushed(&self) -> &[Sample] {
        &self.samples[self.flushed..]
    }

    /// Mark every sample as written
    pub fn mark_flushed(&mut self) {
        self.flushed = self.samples.len();
    }

    /// Write the unflushed tail to `log`.
    ///
    /// Returns the number of rows written. On error nothing is marked, so
    /// the same tail is retried on the next flush.
    pub fn flush_to(&mut self, log: &RunLog) -> Result<usize, TelemetryError> {
        let tail = self.unflushed();
        if tail.is_empty() {
            return Ok(0);
        }
        let count = tail.len();
        log.append(tail)?;
        self.mark_flushed();
        Ok(count)
    }

    /// Every `step`-th sample, starting from the first. Steps below one
    /// return everything.
    pub fn samples(&self, step: usize) -> Vec<Sample> {
        self.samples.iter().step_by(step.max(1)).cloned().collect()
    }
}
