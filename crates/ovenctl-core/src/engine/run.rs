//! Run and calibration tasks

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, SubsecRound};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::control::{HoldController, RampController};
use super::segment::SegmentKind;
use super::{EnginePhase, RunOutcome, Shared};
use crate::checkpoint::Checkpoint;
use crate::oven::{Oven, OvenError};
use crate::program::{Program, Segment};
use crate::telemetry::{RunLog, Sample};

/// Execute `program` to the end, a stop request or an oven fault.
///
/// `elapsed` is the run time already recorded when resuming. Cleanup runs
/// on every exit path.
pub(super) async fn execute<O: Oven>(
    shared: Arc<Shared<O>>,
    program: Program,
    run_name: String,
    elapsed: f64,
    stop: CancellationToken,
) -> RunOutcome {
    let span = tracing::info_span!("run", run = %run_name);
    async move {
        let run_log = match RunLog::create(&shared.run_folder, &run_name) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Failed to create run log for '{run_name}': {e}");
                RunLog::existing(&shared.run_folder, &run_name)
            }
        };

        let mut run = RunContext {
            shared: &shared,
            program: &program,
            run_name: &run_name,
            run_log,
            stop,
            elapsed,
            since_save: 0.0,
            vent_closed: false,
            last_measured: 0.0,
        };

        let outcome = match run.run_segments().await {
            Ok(()) if run.stop.is_cancelled() => RunOutcome::Stopped,
            Ok(()) => RunOutcome::Completed,
            Err(e) => {
                tracing::error!("Run aborted by oven fault: {e}");
                RunOutcome::Faulted(e)
            }
        };
        run.cleanup();
        shared.finish(&outcome);
        tracing::info!("Run ended: {outcome:?}");
        outcome
    }
    .instrument(span)
    .await
}

/// Hold `power` for `duration` or until stopped
pub(super) async fn calibrate<O: Oven>(
    shared: Arc<Shared<O>>,
    power: f64,
    duration: Duration,
    stop: CancellationToken,
) -> RunOutcome {
    tracing::info!("Calibrating at {:.1}% power", power * 100.0);
    let started = {
        let mut oven = shared.oven();
        oven.init_start_program()
            .and_then(|()| oven.set_percentual(power))
    };

    let outcome = match started {
        Ok(()) => {
            tokio::select! {
                _ = stop.cancelled() => RunOutcome::Stopped,
                _ = time::sleep(duration) => RunOutcome::Completed,
            }
        }
        Err(e) => {
            tracing::error!("Calibration aborted by oven fault: {e}");
            RunOutcome::Faulted(e)
        }
    };

    {
        let mut oven = shared.oven();
        if let Err(e) = oven.set_percentual(0.0) {
            tracing::error!("Failed to cut power after calibration: {e}");
        }
        if let Err(e) = oven.end_program() {
            tracing::error!("Failed to end calibration: {e}");
        }
    }
    shared.finish(&outcome);
    tracing::info!("Calibration ended: {outcome:?}");
    outcome
}

/// State of one run while its task executes
struct RunContext<'a, O> {
    shared: &'a Shared<O>,
    program: &'a Program,
    run_name: &'a str,
    run_log: RunLog,
    stop: CancellationToken,
    /// Run time in seconds, including time before a resume
    elapsed: f64,
    /// Run time since the last flush
    since_save: f64,
    vent_closed: bool,
    last_measured: f64,
}

impl<O: Oven> RunContext<'_, O> {
    async fn run_segments(&mut self) -> Result<(), OvenError> {
        self.shared.oven().init_start_program()?;
        self.apply_start_vent_rule()?;

        let program = self.program;
        let mut previous_target = None;
        for segment in &program.points {
            if self.stop.is_cancelled() {
                break;
            }
            self.shared.save_checkpoint(&Checkpoint::new(
                &program.name,
                &segment.segment_name,
                self.run_name,
            ));

            let measured = self.read_temperature()?;
            let kind = SegmentKind::classify(
                previous_target.unwrap_or(measured),
                segment.target_temperature,
            );
            tracing::info!(
                "Segment '{}': {kind:?} to {:.1} °C from {measured:.1} °C",
                segment.segment_name,
                segment.target_temperature
            );
            self.shared.set_phase(EnginePhase::Running(kind));

            if kind.is_ramp() {
                self.ramp(segment, kind, measured).await?;
            } else {
                self.maintain(segment).await?;
            }
            previous_target = Some(segment.target_temperature);
        }
        Ok(())
    }

    fn apply_start_vent_rule(&mut self) -> Result<(), OvenError> {
        if self.program.air_close_at_degrees <= 0.0 {
            self.shared.oven().close_air()?;
            self.vent_closed = true;
        } else {
            self.shared.oven().open_air()?;
        }
        Ok(())
    }

    async fn ramp(&mut self, segment: &Segment, kind: SegmentKind, start: f64) -> Result<(), OvenError> {
        let target = segment.target_temperature;
        let mut controller = RampController::new(
            self.shared.settings.ramp_gains(),
            start,
            target,
            segment.duration_seconds(),
        );
        self.shared.set_target_temperature(controller.desired());

        let mut ticker = self.ticker();
        let mut last_tick = Instant::now();
        loop {
            ticker.tick().await;
            if self.stop.is_cancelled() || kind.target_reached(self.last_measured, target) {
                break;
            }

            let delta = self.advance_clock(&mut last_tick);
            let measured = self.read_temperature()?;
            if kind == SegmentKind::RampingUp {
                self.close_vent_at(measured)?;
            }

            let previous_power = self.shared.oven().percentual();
            let power = controller.update(measured, delta, previous_power);
            self.shared.set_target_temperature(controller.desired());
            self.record(segment, controller.desired(), measured, power);
            self.shared.oven().set_percentual(power)?;
        }
        Ok(())
    }

    async fn maintain(&mut self, segment: &Segment) -> Result<(), OvenError> {
        let target = segment.target_temperature;
        let duration = segment.duration_seconds();
        let mut controller = HoldController::new(self.shared.settings.maintain_gains(), target);
        self.shared.set_target_temperature(target);

        let mut ticker = self.ticker();
        let mut last_tick = Instant::now();
        let mut held = 0.0;
        loop {
            ticker.tick().await;
            if self.stop.is_cancelled() || held >= duration {
                break;
            }

            let delta = self.advance_clock(&mut last_tick);
            held += delta;
            let measured = self.read_temperature()?;
            let power = controller.update(measured, delta);
            self.record(segment, target, measured, power);
            self.shared.oven().set_percentual(power)?;
        }
        Ok(())
    }

    /// Control period ticker, first tick one period from now
    fn ticker(&self) -> Interval {
        let period = self.shared.settings.step_duration();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Seconds since `last_tick`, added to the run clocks
    fn advance_clock(&mut self, last_tick: &mut Instant) -> f64 {
        let now = Instant::now();
        let delta = now.duration_since(*last_tick).as_secs_f64();
        *last_tick = now;
        self.elapsed += delta;
        self.since_save += delta;
        self.shared.set_time_seconds(self.elapsed);
        delta
    }

    fn read_temperature(&mut self) -> Result<f64, OvenError> {
        let measured = self.shared.oven().temperature()?;
        self.last_measured = measured;
        Ok(measured)
    }

    /// Close the vent the first time `measured` reaches the threshold
    fn close_vent_at(&mut self, measured: f64) -> Result<(), OvenError> {
        if !self.vent_closed && measured >= self.program.air_close_at_degrees {
            tracing::info!("Closing vent at {measured:.1} °C");
            self.shared.oven().close_air()?;
            self.vent_closed = true;
        }
        Ok(())
    }

    fn record(&mut self, segment: &Segment, desired: f64, measured: f64, power: f64) {
        let sample = Sample {
            program_name: self.program.name.clone(),
            segment_name: segment.segment_name.clone(),
            seconds_from_start: self.elapsed,
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            desired_temperature: desired,
            measured_temperature: measured,
            power_fraction: power,
            vent_closed: self.vent_closed,
        }
        .rounded();
        tracing::debug!(
            "t={:.0}s desired={:.2} measured={:.2} power={:.4}",
            sample.seconds_from_start,
            sample.desired_temperature,
            sample.measured_temperature,
            sample.power_fraction
        );
        self.shared.recorder().push(sample);

        if self.since_save > self.shared.settings.step_save {
            self.flush();
            self.since_save = 0.0;
        }
    }

    fn flush(&self) {
        let result = self.shared.recorder().flush_to(&self.run_log);
        match result {
            Ok(0) => {}
            Ok(rows) => tracing::debug!("Saved {rows} samples to {}", self.run_log.path().display()),
            Err(e) => tracing::warn!("Failed to save samples to {}: {e}", self.run_log.path().display()),
        }
    }

    /// Flush, cut power, end the program and drop the checkpoint
    fn cleanup(&self) {
        self.flush();
        {
            let mut oven = self.shared.oven();
            if let Err(e) = oven.set_percentual(0.0) {
                tracing::error!("Failed to cut power at end of run: {e}");
            }
            if let Err(e) = oven.end_program() {
                tracing::error!("Failed to end program: {e}");
            }
        }
        self.shared.clear_checkpoint();
    }
}
