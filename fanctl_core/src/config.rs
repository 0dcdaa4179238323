//! Runtime configuration types for the estimator and the controller.
//!
//! These are separate from the TOML-deserialized config in `fanctl_config`;
//! see `conversions` for the mapping.

use crate::error::BuildError;
use crate::table::DutyCycleTable;

/// Tachometer filter parameters. Out-of-range values are clamped by the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TachCfg {
    /// Tach pulses per fan revolution; PC fans emit 2.
    pub pulses_per_revolution: f64,
    /// Weight of the previous period, clamped to [0.0, 0.99].
    pub weighting: f64,
    /// Deadband in rpm, clamped to [1.0, 1000.0].
    pub min_rpm: f64,
}

impl Default for TachCfg {
    fn default() -> Self {
        Self {
            pulses_per_revolution: 2.0,
            weighting: 0.5,
            min_rpm: 5.0,
        }
    }
}

/// How the per-band duty cycles are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DutyValues {
    /// `round(linspace(min, max, thresholds + 1))`.
    Generated,
    /// Interior bands; `min` is prepended and `max` appended.
    Interior(Vec<u8>),
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerCfg {
    pub duty_cycle_min: u8,
    pub duty_cycle_max: u8,
    /// Band boundaries in °C, strictly increasing.
    pub thresholds: Vec<f64>,
    pub duty_cycle_values: DutyValues,
    /// Cooldown margin in °C before leaving a band downward.
    pub hysteresis: f64,
    /// Confirmed evaluations tolerated before a forced re-evaluation.
    pub stuck_counter_limit: u32,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            duty_cycle_min: 50,
            duty_cycle_max: 255,
            thresholds: vec![22.0, 24.0, 26.0, 28.0],
            duty_cycle_values: DutyValues::Generated,
            hysteresis: 2.0,
            stuck_counter_limit: 10,
        }
    }
}

impl ControllerCfg {
    /// Check the configuration without building a controller.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(self.hysteresis.is_finite() && self.hysteresis >= 0.0) {
            return Err(BuildError::InvalidHysteresis(self.hysteresis));
        }
        DutyCycleTable::from_cfg(self).map(|_| ())
    }
}
