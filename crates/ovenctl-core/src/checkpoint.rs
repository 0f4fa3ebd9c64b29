//! Run checkpoint
//!
//! A small file naming the program, segment and run currently executing.
//! Its presence at startup means the previous process stopped in the middle
//! of a run. Every save goes to a temporary file that is synced and then
//! renamed over the previous checkpoint, so a crash never leaves a partially
//! written record behind.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File name of the checkpoint inside the run folder
pub const CHECKPOINT_FILE_NAME: &str = "work.txt";

/// Errors reading or writing the checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed checkpoint: {0}")]
    Malformed(String),
}

/// Marker of the run in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Program being run
    pub program_name: String,
    /// Segment being run, empty before the first segment starts
    pub segment_name: String,
    /// Run name, also the run log name
    pub run_name: String,
}

impl Checkpoint {
    /// Create a checkpoint
    pub fn new(
        program_name: impl Into<String>,
        segment_name: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self {
            program_name: program_name.into(),
            segment_name: segment_name.into(),
            run_name: run_name.into(),
        }
    }
}

/// Checkpoint file in a run folder
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Checkpoint kept in `folder`
    pub fn new(folder: &Path) -> Self {
        Self {
            path: folder.join(CHECKPOINT_FILE_NAME),
        }
    }

    /// Location of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint is present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the checkpoint, `None` if there is none
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let record = reader
            .records()
            .next()
            .ok_or_else(|| CheckpointError::Malformed("empty file".into()))??;

        if record.len() < 2 || record[0].is_empty() {
            return Err(CheckpointError::Malformed(format!(
                "expected program,segment,run; found {} fields",
                record.len()
            )));
        }

        Ok(Some(Checkpoint {
            program_name: record[0].to_string(),
            segment_name: record[1].to_string(),
            run_name: record.get(2).unwrap_or_default().to_string(),
        }))
    }

    /// Replace the checkpoint atomically
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let temp_path = self.path.with_extension("txt.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record([
                &checkpoint.program_name,
                &checkpoint.segment_name,
                &checkpoint.run_name,
            ])?;
            let file = writer
                .into_inner()
                .map_err(|e| CheckpointError::Io(e.into_error()))?;
            file.sync_all()?;
        }

        // Atomic replace (rename is atomic on POSIX)
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Remove the checkpoint. Missing files are fine.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
