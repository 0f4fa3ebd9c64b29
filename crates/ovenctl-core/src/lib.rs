//! # ovenctl Core Library
//!
//! Program controller for industrial kilns and ovens.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Firing programs made of ramp and hold segments
//! - A PID based execution engine running one program at a time
//! - Crash recovery through a checkpoint file
//! - Run telemetry kept in memory and in CSV run logs
//! - A simulated oven and one driving relays and a power regulator
//!
//! ## Example
//!
//! ```rust,ignore
//! use ovenctl_core::prelude::*;
//!
//! let config = OvenControlConfig::load_or_default(OvenControlConfig::default_path())?;
//! let programs = FolderProgramStore::open(&config.controller.program_folder)?;
//! let engine = ProgramEngine::new(SimulatedOven::new(config.oven), config.controller, &programs)?;
//!
//! engine.start_named(&programs, "Bisque", None)?;
//! let outcome = engine.wait_idle().await;
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod oven;
pub mod program;
pub mod status;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ControllerSettings, OvenControlConfig};
    pub use crate::engine::{
        EngineError, EnginePhase, ProgramEngine, RecoveryOutcome, RunOutcome, StartOutcome,
    };
    pub use crate::oven::{Oven, OvenError, OvenModel, SensorError, SimulatedOven};
    pub use crate::program::{FolderProgramStore, Program, ProgramCatalog, Segment};
    pub use crate::status::{StatusFacade, StatusSnapshot};
    pub use crate::telemetry::{RunLog, Sample};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
