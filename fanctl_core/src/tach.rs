//! Fan speed from tachometer pulses.
//!
//! Each rising edge closes one pulse period; periods are smoothed with an
//! exponential filter. When the watchdog reports that no edge arrived in its
//! window, the smoothed period is stretched by the window length so a
//! stopping fan decays towards 0 rpm instead of freezing at its last speed.
//!
//! Edge and watchdog handlers run on the pulse source's threads while
//! `get_rpm()` runs on the control loop. Both sides go through one mutex, so
//! a reader never observes a half-applied update.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fanctl_traits::{PulseSource, Tick};
use tracing::{debug, info, trace};

use crate::config::TachCfg;
use crate::error::{BuildError, FanError};
use crate::hw_error::{Seam, map_hw_error};

/// Window after which a silent tach line counts as a watchdog timeout.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(200);

/// Periods at or above this are no longer extended by the watchdog.
pub const PERIOD_CEILING_US: f64 = 2_000_000_000.0;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Largest tick difference accepted as forward time (about 35 minutes).
const MAX_FORWARD_TICKS: u32 = u32::MAX / 2;

/// Microseconds from `older` to `newer` on the wrapping 32-bit tick counter.
#[inline]
pub fn tick_diff(older: Tick, newer: Tick) -> u32 {
    newer.wrapping_sub(older)
}

/// Filter state shared between the pulse handlers and readers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TachState {
    pub last_rising_edge_tick: Option<Tick>,
    /// Smoothed pulse period in microseconds.
    pub smoothed_period_us: Option<f64>,
}

#[derive(Debug)]
struct Filter {
    state: Mutex<TachState>,
    new_weight: f64,
    old_weight: f64,
    watchdog_us: f64,
}

impl Filter {
    fn lock(&self) -> MutexGuard<'_, TachState> {
        // Plain data: a panicking holder cannot leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_rising_edge(&self, tick: Tick) {
        let mut st = self.lock();
        if let Some(prev) = st.last_rising_edge_tick {
            let t = tick_diff(prev, tick);
            if t == 0 {
                trace!(tick, "duplicate edge tick ignored");
                return;
            }
            // A difference past half the counter range is an edge that went backwards.
            if t > MAX_FORWARD_TICKS {
                trace!(tick, previous = prev, "out-of-order edge tick ignored");
                return;
            }
            let t = f64::from(t);
            st.smoothed_period_us = Some(match st.smoothed_period_us {
                Some(p) => self.old_weight * p + self.new_weight * t,
                None => t,
            });
        }
        st.last_rising_edge_tick = Some(tick);
    }

    fn on_watchdog_timeout(&self) {
        let mut st = self.lock();
        if let Some(p) = st.smoothed_period_us
            && p < PERIOD_CEILING_US
        {
            st.smoothed_period_us = Some(p + self.watchdog_us);
            trace!(period_us = p + self.watchdog_us, "tach watchdog extended period");
        }
    }
}

/// Smoothed rpm estimator bound to a pulse source.
pub struct PulseRateEstimator<P: PulseSource> {
    filter: Arc<Filter>,
    pulses_per_revolution: f64,
    min_rpm: f64,
    source: Option<P>,
}

impl<P: PulseSource> std::fmt::Debug for PulseRateEstimator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseRateEstimator")
            .field("state", &self.state())
            .field("pulses_per_revolution", &self.pulses_per_revolution)
            .field("min_rpm", &self.min_rpm)
            .field("attached", &self.source.is_some())
            .finish()
    }
}

impl<P: PulseSource> PulseRateEstimator<P> {
    /// Subscribe to `source` and arm its watchdog with [`WATCHDOG_TIMEOUT`].
    pub fn new(mut source: P, cfg: TachCfg) -> Result<Self, FanError> {
        if !(cfg.pulses_per_revolution.is_finite() && cfg.pulses_per_revolution > 0.0) {
            return Err(FanError::Tach(
                BuildError::InvalidConfig("pulses_per_revolution must be > 0").to_string(),
            ));
        }
        let weighting = if cfg.weighting.is_nan() {
            0.0
        } else {
            cfg.weighting.clamp(0.0, 0.99)
        };
        let min_rpm = if cfg.min_rpm.is_nan() {
            1.0
        } else {
            cfg.min_rpm.clamp(1.0, 1000.0)
        };
        let filter = Arc::new(Filter {
            state: Mutex::new(TachState::default()),
            new_weight: 1.0 - weighting,
            old_weight: weighting,
            watchdog_us: WATCHDOG_TIMEOUT.as_micros() as f64,
        });

        let on_edge = {
            let f = filter.clone();
            Box::new(move |tick: Tick| f.on_rising_edge(tick))
        };
        let on_watchdog = {
            let f = filter.clone();
            Box::new(move || f.on_watchdog_timeout())
        };
        source
            .subscribe(WATCHDOG_TIMEOUT, on_edge, on_watchdog)
            .map_err(|e| map_hw_error(Seam::Tach, e.as_ref()))?;
        debug!(
            pulses_per_revolution = cfg.pulses_per_revolution,
            weighting, min_rpm, "tach estimator attached"
        );

        Ok(Self {
            filter,
            pulses_per_revolution: cfg.pulses_per_revolution,
            min_rpm,
            source: Some(source),
        })
    }

    /// Record a rising edge observed at `tick`.
    pub fn on_rising_edge(&self, tick: Tick) {
        self.filter.on_rising_edge(tick);
    }

    /// Record that the watchdog window elapsed without an edge.
    pub fn on_watchdog_timeout(&self) {
        self.filter.on_watchdog_timeout();
    }

    /// Smoothed speed in revolutions per minute; 0.0 before the first full
    /// period and for any speed below the `min_rpm` deadband.
    pub fn get_rpm(&self) -> f64 {
        let Some(period_us) = self.filter.lock().smoothed_period_us else {
            return 0.0;
        };
        let rpm = MICROS_PER_MINUTE / (period_us * self.pulses_per_revolution);
        if rpm < self.min_rpm { 0.0 } else { rpm }
    }

    pub fn state(&self) -> TachState {
        *self.filter.lock()
    }

    /// Smoothed pulse period, if one was measured.
    pub fn smoothed_period(&self) -> Option<Duration> {
        self.filter
            .lock()
            .smoothed_period_us
            .map(|us| Duration::from_secs_f64(us / 1e6))
    }

    /// Weights of the (new, old) sample in the smoothing filter.
    pub fn weights(&self) -> (f64, f64) {
        (self.filter.new_weight, self.filter.old_weight)
    }

    pub fn min_rpm(&self) -> f64 {
        self.min_rpm
    }

    /// Disarm the watchdog and release the pulse source. Later calls are no-ops.
    pub fn clean_up(&mut self) -> Result<(), FanError> {
        let Some(mut source) = self.source.take() else {
            return Ok(());
        };
        source
            .release()
            .map_err(|e| map_hw_error(Seam::Tach, e.as_ref()))?;
        info!("tach estimator released its pulse source");
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }
}

impl<P: PulseSource> Drop for PulseRateEstimator<P> {
    fn drop(&mut self) {
        if let Err(e) = self.clean_up() {
            tracing::warn!(error = %e, "tach clean-up failed during drop");
        }
    }
}
