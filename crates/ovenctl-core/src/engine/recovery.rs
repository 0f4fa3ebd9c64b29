//! Crash recovery
//!
//! When the engine starts and finds a checkpoint, the previous process died
//! during a run. The run is resumed only if the interrupted segment allows
//! it and the outage was short enough; otherwise the checkpoint is dropped.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::segment::resume_index;
use crate::checkpoint::Checkpoint;
use crate::program::{Program, ProgramCatalog};
use crate::telemetry::{RunLog, Sample};

/// What the engine did with the checkpoint it found at startup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum RecoveryOutcome {
    /// No run was interrupted
    NoCheckpoint,
    /// The interrupted run was restarted
    Resumed {
        /// Program of the interrupted run
        program_name: String,
        /// Segment the run restarted from
        segment_name: String,
        /// Run name reused from the checkpoint
        run_name: String,
    },
    /// The checkpoint was cleared without resuming
    Discarded {
        /// Why the run could not continue
        reason: String,
    },
}

/// Decision for a checkpoint
#[derive(Debug)]
pub(super) enum ResumePlan {
    Resume {
        /// Program cut to start at the resume segment
        program: Program,
        /// Samples already in the run log
        history: Vec<Sample>,
    },
    Discard(String),
}

/// Decide whether the run named by `checkpoint` can continue at `now`
pub(super) fn plan(
    checkpoint: &Checkpoint,
    catalog: &dyn ProgramCatalog,
    run_folder: &Path,
    now: NaiveDateTime,
) -> ResumePlan {
    let Some(program) = catalog.programs().remove(&checkpoint.program_name) else {
        return ResumePlan::Discard(format!(
            "program '{}' no longer exists",
            checkpoint.program_name
        ));
    };

    let history = match RunLog::existing(run_folder, &checkpoint.run_name).read() {
        Ok(history) => history,
        Err(e) => {
            return ResumePlan::Discard(format!(
                "run log of '{}' is unreadable: {e}",
                checkpoint.run_name
            ))
        }
    };
    let Some(last_sample) = history.last() else {
        return ResumePlan::Discard(format!("run log of '{}' is empty", checkpoint.run_name));
    };

    let Some(index) = program.segment_index(&checkpoint.segment_name) else {
        return ResumePlan::Discard(format!(
            "segment '{}' not found in program '{}'",
            checkpoint.segment_name, program.name
        ));
    };
    let segment = &program.points[index];

    if !segment.restart_from_last_ascending_ramp {
        return ResumePlan::Discard(format!(
            "segment '{}' does not allow restarting",
            segment.segment_name
        ));
    }

    let outage_minutes = (now - last_sample.timestamp).num_seconds().max(0) as f64 / 60.0;
    if outage_minutes > segment.time_after_no_restart_minutes {
        return ResumePlan::Discard(format!(
            "interrupted {outage_minutes:.1} min ago, restart allowed within {} min",
            segment.time_after_no_restart_minutes
        ));
    }

    let program = program.resumed_from(resume_index(&program.points, index));
    ResumePlan::Resume { program, history }
}
