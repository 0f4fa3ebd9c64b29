use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ovenctl_core::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ovenctl")]
#[command(version, about = "Run firing programs on a simulated oven")]
struct Cli {
    /// Configuration file (JSON). Defaults to the user data folder.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seconds between status lines while a run is active
    #[arg(long, default_value = "10", global = true)]
    report_every: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the programs in the program folder
    Programs,
    /// Add or replace a program from a JSON file
    Import { file: PathBuf },
    /// Delete a program
    Remove { name: String },
    /// Run a program until it ends or Ctrl-C is pressed
    Run {
        name: String,
        /// Run name, derived from the time and program when omitted
        #[arg(long)]
        run_name: Option<String>,
    },
    /// Run the single segment test ramp
    TestRamp {
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        minutes: Option<f64>,
    },
    /// Hold a fixed power fraction for one minute
    Calibrate { power: f64 },
    /// List ended runs
    Runs,
    /// Move ended run logs to another folder
    Archive { destination: PathBuf },
    /// Print the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(OvenControlConfig::default_path);
    let config = OvenControlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
    let report_every = Duration::from_secs(cli.report_every.max(1));

    let mut programs = FolderProgramStore::open(&config.controller.program_folder)
        .context("Failed to open program folder")?;
    let engine = ProgramEngine::new(
        SimulatedOven::new(config.oven.clone()),
        config.controller.clone(),
        &programs,
    )?;

    match engine.recovery() {
        RecoveryOutcome::Resumed {
            program_name,
            segment_name,
            run_name,
        } => {
            println!("Resuming '{program_name}' at '{segment_name}' (run {run_name})");
            supervise(&engine, report_every).await?;
        }
        RecoveryOutcome::Discarded { reason } => println!("Interrupted run not resumed: {reason}"),
        RecoveryOutcome::NoCheckpoint => {}
    }

    match cli.command {
        Commands::Programs => {
            for name in programs.names() {
                let Some(program) = programs.get(&name) else { continue };
                let minutes: f64 = program.points.iter().map(|s| s.duration_minutes).sum();
                println!("{name}: {} segments, {minutes:.0} min", program.points.len());
            }
        }
        Commands::Import { file } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let program: Program = serde_json::from_str(&content)
                .with_context(|| format!("Invalid program in {}", file.display()))?;
            println!("Saved program '{}'", program.name);
            programs.save(program)?;
        }
        Commands::Remove { name } => {
            programs.delete(&name)?;
            println!("Deleted program '{name}'");
        }
        Commands::Run { name, run_name } => {
            let outcome = engine.start_named(&programs, &name, run_name)?;
            started(outcome)?;
            supervise(&engine, report_every).await?;
        }
        Commands::TestRamp {
            temperature,
            minutes,
        } => {
            let settings = engine.settings();
            let program = Program::test_ramp(
                temperature.unwrap_or(settings.test_ramp_temperature),
                minutes.unwrap_or(settings.test_ramp_minutes),
            );
            started(engine.start_program(program, None))?;
            supervise(&engine, report_every).await?;
        }
        Commands::Calibrate { power } => {
            engine.set_power_one_minute(power)?;
            println!("Holding {:.0}% power for one minute", power.clamp(0.0, 1.0) * 100.0);
            supervise(&engine, report_every).await?;
        }
        Commands::Runs => {
            for run in engine.ended_runs()? {
                println!("{run}");
            }
        }
        Commands::Archive { destination } => {
            let moved = engine.archive_runs(&destination)?;
            println!("Archived {} run logs to {}", moved.len(), destination.display());
        }
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config.save(&config_path)?;
                println!("Written to {}", config_path.display());
            }
        }
    }

    Ok(())
}

fn started(outcome: StartOutcome) -> Result<()> {
    match outcome {
        StartOutcome::Started { run_name } => {
            println!("Started run {run_name}");
            Ok(())
        }
        StartOutcome::Rejected => bail!("Oven is busy"),
    }
}

/// Print status until the active task ends. Ctrl-C requests a stop.
async fn supervise<O: Oven + 'static>(engine: &ProgramEngine<O>, every: Duration) -> Result<()> {
    let mut report = tokio::time::interval(every);
    let wait = engine.wait_idle();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                engine.request_stop();
            }
            _ = report.tick() => print_status(engine),
        }
    };

    match outcome {
        Some(RunOutcome::Completed) => println!("Completed"),
        Some(RunOutcome::Stopped) => println!("Stopped"),
        Some(RunOutcome::Faulted(e)) => bail!("Run aborted: {e}"),
        None => bail!("Run task ended unexpectedly"),
    }
    Ok(())
}

fn print_status<O: Oven + 'static>(engine: &ProgramEngine<O>) {
    let status = engine.status();
    let measured = match engine.read_temperature() {
        Ok(t) => format!("{t:.1} °C"),
        Err(e) => e.to_string(),
    };
    let power = status
        .last_sample
        .as_ref()
        .map_or(String::from("-"), |s| format!("{:.0}%", s.power_fraction * 100.0));
    println!(
        "{:>7.0} s  {:<24}  target {:>6.1} °C  oven {measured}  power {power}",
        status.time_seconds,
        format!("{:?}", status.phase),
        status.target_temperature,
    );
}
