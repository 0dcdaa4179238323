//! Test and helper mocks for fanctl_core

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fanctl_traits::{EdgeHandler, PulseSource, PwmOutput, Thermometer, Tick, WatchdogHandler};

type Handlers = Option<(EdgeHandler, WatchdogHandler)>;

/// A pulse source whose edges and watchdog timeouts are injected by hand
/// through a [`PulseHandle`].
#[derive(Default)]
pub struct ManualPulseSource {
    handlers: Arc<Mutex<Handlers>>,
    watchdog: Arc<Mutex<Option<Duration>>>,
    releases: Arc<AtomicUsize>,
}

/// Drives a [`ManualPulseSource`] from test code.
#[derive(Clone)]
pub struct PulseHandle {
    handlers: Arc<Mutex<Handlers>>,
    watchdog: Arc<Mutex<Option<Duration>>>,
    releases: Arc<AtomicUsize>,
}

impl ManualPulseSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> PulseHandle {
        PulseHandle {
            handlers: self.handlers.clone(),
            watchdog: self.watchdog.clone(),
            releases: self.releases.clone(),
        }
    }
}

impl PulseSource for ManualPulseSource {
    fn subscribe(
        &mut self,
        watchdog: Duration,
        on_edge: EdgeHandler,
        on_watchdog: WatchdogHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut slot = self.handlers.lock().map_err(|e| e.to_string())?;
        if slot.is_some() {
            return Err("manual pulse source already subscribed".into());
        }
        *slot = Some((on_edge, on_watchdog));
        *self.watchdog.lock().map_err(|e| e.to_string())? = Some(watchdog);
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.handlers.lock().map_err(|e| e.to_string())?.take();
        self.watchdog.lock().map_err(|e| e.to_string())?.take();
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PulseHandle {
    /// Deliver a rising edge. Returns false when nobody is subscribed.
    pub fn edge(&self, tick: Tick) -> bool {
        match self.handlers.lock() {
            Ok(mut g) => match g.as_mut() {
                Some((on_edge, _)) => {
                    on_edge(tick);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Deliver a watchdog timeout. Returns false when nobody is subscribed.
    pub fn timeout(&self) -> bool {
        match self.handlers.lock() {
            Ok(mut g) => match g.as_mut() {
                Some((_, on_watchdog)) => {
                    on_watchdog();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Watchdog window requested by the subscriber, while subscribed.
    pub fn watchdog(&self) -> Option<Duration> {
        self.watchdog.lock().ok().and_then(|g| *g)
    }

    pub fn is_subscribed(&self) -> bool {
        self.handlers.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// A thermometer that replays a script of readings; errors are given as
/// messages. Once the script runs out the last reading repeats.
#[derive(Debug, Clone)]
pub struct ScriptedThermometer {
    script: VecDeque<Result<f64, String>>,
    last: Option<Result<f64, String>>,
}

impl ScriptedThermometer {
    pub fn new(script: impl IntoIterator<Item = Result<f64, String>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: None,
        }
    }

    pub fn readings(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(values.into_iter().map(Ok))
    }
}

impl Thermometer for ScriptedThermometer {
    fn read_celsius(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next);
        }
        match &self.last {
            Some(Ok(t)) => Ok(*t),
            Some(Err(msg)) => Err(msg.clone().into()),
            None => Err("no readings scripted".into()),
        }
    }
}

/// A PWM output that records every duty cycle it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingPwm {
    applied: Arc<Mutex<Vec<u8>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingPwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<u8> {
        self.applied.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Make later writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl PwmOutput for RecordingPwm {
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("pwm write failed".into());
        }
        self.applied.lock().map_err(|e| e.to_string())?.push(duty);
        Ok(())
    }
}
