pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pi;
pub mod w1;
pub mod watchdog;

use fanctl_traits::{
    Clock, EdgeHandler, MonotonicClock, PulseSource, PwmOutput, Thermometer, WatchdogHandler,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use crate::error::HwError;
use crate::watchdog::Watchdog;

pub use w1::W1Thermometer;

/// Simulated 4-pin fan: the PWM side sets the duty cycle, the tachometer side
/// emits rising edges at the speed that duty cycle would produce.
#[derive(Debug, Clone)]
pub struct SimulatedFan {
    duty: Arc<AtomicU8>,
    max_rpm: f64,
    pulses_per_rev: f64,
}

impl SimulatedFan {
    pub fn new(max_rpm: f64, pulses_per_rev: f64) -> Self {
        Self {
            duty: Arc::new(AtomicU8::new(0)),
            max_rpm,
            pulses_per_rev,
        }
    }

    pub fn pwm(&self) -> SimulatedPwm {
        SimulatedPwm {
            duty: self.duty.clone(),
        }
    }

    pub fn pulse_source(&self) -> SimulatedPulseSource {
        SimulatedPulseSource {
            fan: self.clone(),
            shutdown: Arc::new(AtomicBool::new(false)),
            generator: None,
            watchdog: None,
        }
    }

    pub fn duty_cycle(&self) -> u8 {
        self.duty.load(Ordering::Relaxed)
    }

    /// Time between two tachometer pulses at `duty`, `None` when stopped.
    pub fn pulse_period(&self, duty: u8) -> Option<Duration> {
        let rpm = self.max_rpm * f64::from(duty) / 255.0;
        if rpm <= 0.0 || self.pulses_per_rev <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(60.0 / (rpm * self.pulses_per_rev)))
    }
}

/// Simulated PWM output
pub struct SimulatedPwm {
    duty: Arc<AtomicU8>,
}

impl PwmOutput for SimulatedPwm {
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.duty.store(duty, Ordering::Relaxed);
        tracing::debug!(duty, "pwm duty cycle (simulated)");
        Ok(())
    }
}

/// Simulated tachometer driven by a generator thread.
pub struct SimulatedPulseSource {
    fan: SimulatedFan,
    shutdown: Arc<AtomicBool>,
    generator: Option<std::thread::JoinHandle<()>>,
    watchdog: Option<Watchdog>,
}

impl PulseSource for SimulatedPulseSource {
    fn subscribe(
        &mut self,
        watchdog: Duration,
        mut on_edge: EdgeHandler,
        on_watchdog: WatchdogHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.generator.is_some() {
            return Err(Box::new(HwError::AlreadySubscribed));
        }
        let wd = Watchdog::arm(watchdog, on_watchdog)?;
        let feeder = wd.feeder();
        let fan = self.fan.clone();
        self.shutdown.store(false, Ordering::Relaxed);
        let shutdown = self.shutdown.clone();
        let clock = MonotonicClock::new();
        let epoch = clock.now();

        let generator = std::thread::Builder::new()
            .name("fanctl-sim-tach".into())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match fan.pulse_period(fan.duty_cycle()) {
                        Some(period) => {
                            clock.sleep(period);
                            on_edge(clock.tick_since(epoch));
                            feeder.feed();
                        }
                        // Stopped fan: no edges, let the watchdog fire.
                        None => clock.sleep(Duration::from_millis(10)),
                    }
                }
                tracing::trace!("simulated tachometer exiting cleanly");
            })
            .map_err(HwError::Io)?;

        self.generator = Some(generator);
        self.watchdog = Some(wd);
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut wd) = self.watchdog.take() {
            wd.disarm();
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.generator.take() {
            if handle.join().is_err() {
                tracing::warn!("simulated tachometer panicked during shutdown");
            }
        }
        Ok(())
    }
}

impl Drop for SimulatedPulseSource {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Simulated thermometer sweeping between two temperatures, one step per read.
#[derive(Debug, Clone)]
pub struct SimulatedThermometer {
    celsius: f64,
    step: f64,
    low: f64,
    high: f64,
}

impl SimulatedThermometer {
    pub fn new(low: f64, high: f64, step: f64) -> Self {
        Self {
            celsius: low,
            step: step.abs(),
            low: low.min(high),
            high: low.max(high),
        }
    }
}

impl Thermometer for SimulatedThermometer {
    fn read_celsius(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let t = self.celsius;
        let next = t + self.step;
        if next > self.high || next < self.low {
            self.step = -self.step;
        }
        self.celsius = (t + self.step).clamp(self.low, self.high);
        tracing::trace!(celsius = t, "thermometer sample (simulated)");
        Ok(t)
    }
}
