//! Threshold / duty-cycle table shared by the controller.
//!
//! Band `0` is everything below `thresholds[0]`, band `i` (for `0 < i < n`)
//! lies between `thresholds[i-1]` and `thresholds[i]`, and band `n` is
//! everything above the last threshold. Each band has one duty cycle, so a
//! table always holds `thresholds.len() + 1` values.

use crate::config::{ControllerCfg, DutyValues};
use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq)]
pub struct DutyCycleTable {
    thresholds: Vec<f64>,
    values: Vec<u8>,
}

impl DutyCycleTable {
    /// Validate a complete table: non-empty, finite, strictly increasing
    /// thresholds and exactly one value per band.
    pub fn new(thresholds: Vec<f64>, values: Vec<u8>) -> Result<Self, BuildError> {
        if thresholds.is_empty() {
            return Err(BuildError::EmptyThresholds);
        }
        if let Some(t) = thresholds.iter().find(|t| !t.is_finite()) {
            return Err(BuildError::NonFiniteThreshold(*t));
        }
        if let Some(i) = thresholds.windows(2).position(|w| w[0] >= w[1]) {
            return Err(BuildError::ThresholdsNotIncreasing(i + 1));
        }
        if values.len() != thresholds.len() + 1 {
            return Err(BuildError::ValueCountMismatch {
                expected: thresholds.len() + 1,
                got: values.len(),
            });
        }
        Ok(Self { thresholds, values })
    }

    /// Values evenly spaced from `min` to `max`.
    pub fn generated(thresholds: Vec<f64>, min: u8, max: u8) -> Result<Self, BuildError> {
        let values = linspace_rounded(min, max, thresholds.len() + 1);
        Self::new(thresholds, values)
    }

    /// `min`, then the interior values, then `max`.
    pub fn with_interior(
        thresholds: Vec<f64>,
        min: u8,
        interior: &[u8],
        max: u8,
    ) -> Result<Self, BuildError> {
        let mut values = Vec::with_capacity(interior.len() + 2);
        values.push(min);
        values.extend_from_slice(interior);
        values.push(max);
        Self::new(thresholds, values)
    }

    pub fn from_cfg(cfg: &ControllerCfg) -> Result<Self, BuildError> {
        if cfg.duty_cycle_min > cfg.duty_cycle_max {
            return Err(BuildError::MinAboveMax {
                min: cfg.duty_cycle_min,
                max: cfg.duty_cycle_max,
            });
        }
        match &cfg.duty_cycle_values {
            DutyValues::Generated => Self::generated(
                cfg.thresholds.clone(),
                cfg.duty_cycle_min,
                cfg.duty_cycle_max,
            ),
            DutyValues::Interior(interior) => Self::with_interior(
                cfg.thresholds.clone(),
                cfg.duty_cycle_min,
                interior,
                cfg.duty_cycle_max,
            ),
        }
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Duty cycle of the coolest band.
    pub fn floor(&self) -> u8 {
        self.values[0]
    }
}

/// `n` values from `min` to `max` inclusive with equal spacing, rounded half
/// to even. `n < 2` yields just `[min]` (or nothing for `n == 0`).
pub fn linspace_rounded(min: u8, max: u8, n: usize) -> Vec<u8> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let start = f64::from(min);
            let step = (f64::from(max) - start) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        max
                    } else {
                        (start + step * i as f64).round_ties_even().clamp(0.0, 255.0) as u8
                    }
                })
                .collect()
        }
    }
}

/// Duty cycle as a percentage of full scale, rounded to nearest.
///
/// `100 * duty / 255` never lands exactly on `.5`, so the rounding mode
/// cannot change the result.
#[inline]
pub fn duty_cycle_percent(duty: u8) -> u8 {
    ((u16::from(duty) * 100 + 127) / 255) as u8
}
