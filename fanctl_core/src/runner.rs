//! The driver loop: temperature in, duty cycle out, rpm read back.
//!
//! [`FanLoop::cycle`] runs one evaluation; [`FanLoop::run_until`] repeats it
//! at a fixed period until a shutdown flag is raised. Neither the estimator
//! nor the controller know about each other; only this loop ties them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fanctl_traits::clock::Clock;
use fanctl_traits::{PulseSource, PwmOutput, Thermometer};
use tracing::{debug, info, warn};

use crate::controller::{DutyCycle, DutyCycleController};
use crate::error::{FanError, Result};
use crate::hw_error::{Seam, map_hw_error};
use crate::tach::PulseRateEstimator;

/// Granularity at which the pacing wait checks the shutdown flag.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// °C, rounded to one decimal.
    pub temperature: f64,
    pub duty_cycle: DutyCycle,
    /// Rounded to the nearest integer.
    pub rpm: u32,
}

/// Receives every cycle report (file export, metrics, ...).
pub trait ReportSink {
    fn publish(&mut self, report: &CycleReport) -> Result<()>;
}

impl<F> ReportSink for F
where
    F: FnMut(&CycleReport) -> Result<()>,
{
    fn publish(&mut self, report: &CycleReport) -> Result<()> {
        self(report)
    }
}

/// Round to one decimal place.
#[inline]
pub fn round_temperature(celsius: f64) -> f64 {
    (celsius * 10.0).round() / 10.0
}

pub struct FanLoop<T: Thermometer, W: PwmOutput, P: PulseSource> {
    thermometer: T,
    pwm: W,
    estimator: PulseRateEstimator<P>,
    controller: DutyCycleController,
    sinks: Vec<Box<dyn ReportSink + Send>>,
    last: Option<CycleReport>,
    shut_down: bool,
}

impl<T: Thermometer, W: PwmOutput, P: PulseSource> core::fmt::Debug for FanLoop<T, W, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FanLoop")
            .field("controller", &self.controller)
            .field("estimator", &self.estimator)
            .field("sinks", &self.sinks.len())
            .field("last", &self.last)
            .finish()
    }
}

impl<T: Thermometer, W: PwmOutput, P: PulseSource> FanLoop<T, W, P> {
    pub fn new(
        thermometer: T,
        pwm: W,
        estimator: PulseRateEstimator<P>,
        controller: DutyCycleController,
    ) -> Self {
        Self {
            thermometer,
            pwm,
            estimator,
            controller,
            sinks: Vec::new(),
            last: None,
            shut_down: false,
        }
    }

    /// Add a sink that receives every cycle report. Sink failures are logged
    /// and never stop the loop.
    pub fn with_sink(mut self, sink: impl ReportSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn controller(&self) -> &DutyCycleController {
        &self.controller
    }

    pub fn estimator(&self) -> &PulseRateEstimator<P> {
        &self.estimator
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last
    }

    /// One evaluation: read temperature, pick a duty cycle, read rpm, apply
    /// the duty cycle and publish.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        let raw = self
            .thermometer
            .read_celsius()
            .map_err(|e| map_hw_error(Seam::Thermometer, e.as_ref()))?;
        let temperature = round_temperature(raw);
        let duty_cycle = self.controller.get_duty_cycle(temperature);
        let rpm = self.estimator.get_rpm().round() as u32;

        self.pwm
            .set_duty_cycle(duty_cycle.value)
            .map_err(|e| map_hw_error(Seam::Pwm, e.as_ref()))?;

        let report = CycleReport {
            temperature,
            duty_cycle,
            rpm,
        };
        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(&report) {
                warn!(error = %e, "report sink failed");
            }
        }
        info!(
            temperature,
            duty_cycle = duty_cycle.value,
            percent = duty_cycle.percent,
            rpm,
            "cycle"
        );
        self.last = Some(report);
        Ok(report)
    }

    /// Run cycles every `period` until `stop` is raised or `max_cycles`
    /// cycles have completed. Returns the number of cycles run.
    ///
    /// A failed temperature read skips the cycle; any other error ends the
    /// loop. The caller still owns clean-up (see [`FanLoop::shutdown`]).
    pub fn run_until<C: Clock>(
        &mut self,
        period: Duration,
        clock: &C,
        stop: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<u64> {
        let mut cycles = 0u64;
        while !stop.load(Ordering::Relaxed) {
            let started = clock.now();
            match self.cycle() {
                Ok(_) => {}
                Err(FanError::Sensor(e)) => warn!(error = %e, "temperature read failed, skipping cycle"),
                Err(e) => return Err(e),
            }
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            loop {
                let elapsed = clock.now().saturating_duration_since(started);
                if elapsed >= period || stop.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(SHUTDOWN_POLL.min(period - elapsed));
            }
        }
        debug!(cycles, "fan loop stopped");
        Ok(cycles)
    }

    /// Stop the fan and release the tachometer. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let pwm = self
            .pwm
            .set_duty_cycle(0)
            .map_err(|e| map_hw_error(Seam::Pwm, e.as_ref()));
        let tach = self.estimator.clean_up();
        info!("fan loop shut down");
        pwm.and(tach)
    }
}

impl<T: Thermometer, W: PwmOutput, P: PulseSource> Drop for FanLoop<T, W, P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "fan loop shutdown failed during drop");
        }
    }
}
