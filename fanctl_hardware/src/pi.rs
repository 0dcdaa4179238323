//! Raspberry Pi backends (rppal).
use std::time::Duration;

use fanctl_traits::{Clock, EdgeHandler, MonotonicClock, PulseSource, PwmOutput, WatchdogHandler};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use tracing::{debug, info};

use crate::error::{HwError, Result};
use crate::watchdog::Watchdog;

/// Tachometer on a GPIO input with a rising-edge interrupt.
///
/// The tach line is open collector; the internal pull-up is enabled.
pub struct GpioPulseSource {
    pin: u8,
    input: Option<InputPin>,
    watchdog: Option<Watchdog>,
}

impl GpioPulseSource {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            input: None,
            watchdog: None,
        }
    }
}

impl PulseSource for GpioPulseSource {
    fn subscribe(
        &mut self,
        watchdog: Duration,
        mut on_edge: EdgeHandler,
        on_watchdog: WatchdogHandler,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.input.is_some() {
            return Err(Box::new(HwError::AlreadySubscribed));
        }
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let mut input = gpio
            .get(self.pin)
            .map_err(|e| HwError::Gpio(format!("open tach pin {}: {e}", self.pin)))?
            .into_input_pullup();

        let wd = Watchdog::arm(watchdog, on_watchdog)?;
        let feeder = wd.feeder();
        let clock = MonotonicClock::new();
        let epoch = clock.now();
        input
            .set_async_interrupt(Trigger::RisingEdge, move |_level| {
                on_edge(clock.tick_since(epoch));
                feeder.feed();
            })
            .map_err(|e| HwError::Gpio(format!("tach interrupt: {e}")))?;

        info!(pin = self.pin, "tachometer subscribed");
        self.input = Some(input);
        self.watchdog = Some(wd);
        Ok(())
    }

    fn release(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut wd) = self.watchdog.take() {
            wd.disarm();
        }
        if let Some(mut input) = self.input.take() {
            input
                .clear_async_interrupt()
                .map_err(|e| HwError::Gpio(format!("clear tach interrupt: {e}")))?;
            debug!(pin = self.pin, "tachometer released");
        }
        Ok(())
    }
}

impl Drop for GpioPulseSource {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Software PWM on a GPIO output.
pub struct GpioPwm {
    pin: OutputPin,
    frequency_hz: f64,
}

impl GpioPwm {
    pub fn new(pin: u8, frequency_hz: f64) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open pwm pin {pin}: {e}")))?
            .into_output_low();
        Ok(Self { pin, frequency_hz })
    }
}

impl PwmOutput for GpioPwm {
    fn set_duty_cycle(
        &mut self,
        duty: u8,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pin
            .set_pwm_frequency(self.frequency_hz, f64::from(duty) / 255.0)
            .map_err(|e| HwError::Gpio(format!("set pwm: {e}")))?;
        debug!(duty, "pwm duty cycle");
        Ok(())
    }
}

impl Drop for GpioPwm {
    fn drop(&mut self) {
        let _ = self.pin.clear_pwm();
        self.pin.set_low();
    }
}
