pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Tick of a free-running 32-bit microsecond counter. Wraps roughly every 72 minutes.
pub type Tick = u32;

/// Handler invoked with the tick of each rising edge on the tachometer line.
pub type EdgeHandler = Box<dyn FnMut(Tick) + Send + 'static>;

/// Handler invoked when no edge arrived within the watchdog window.
pub type WatchdogHandler = Box<dyn FnMut() + Send + 'static>;

/// Source of tachometer pulses.
///
/// Implementations deliver rising edges and watchdog timeouts from their own
/// context (interrupt thread, timer thread, test code). The watchdog must be
/// re-armed after every firing until `release()` is called.
pub trait PulseSource {
    fn subscribe(
        &mut self,
        watchdog: Duration,
        on_edge: EdgeHandler,
        on_watchdog: WatchdogHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Disarm the watchdog and drop the edge subscription.
    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub trait PwmOutput {
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub trait Thermometer {
    /// Temperature in degrees Celsius.
    fn read_celsius(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: PwmOutput + ?Sized> PwmOutput for Box<T> {
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_duty_cycle(duty)
    }
}

impl<T: Thermometer + ?Sized> Thermometer for Box<T> {
    fn read_celsius(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_celsius()
    }
}

impl<T: PulseSource + ?Sized> PulseSource for Box<T> {
    fn subscribe(
        &mut self,
        watchdog: Duration,
        on_edge: EdgeHandler,
        on_watchdog: WatchdogHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).subscribe(watchdog, on_edge, on_watchdog)
    }
    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).release()
    }
}
