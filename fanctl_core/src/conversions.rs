//! `From` implementations bridging `fanctl_config` types to `fanctl_core` types.

use crate::config::{ControllerCfg, DutyValues, TachCfg};

// ── TachCfg ──────────────────────────────────────────────────────────────────

impl From<&fanctl_config::TachCfg> for TachCfg {
    fn from(c: &fanctl_config::TachCfg) -> Self {
        Self {
            pulses_per_revolution: c.pulses_per_revolution,
            weighting: c.weighting,
            min_rpm: c.min_rpm,
        }
    }
}

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl From<&fanctl_config::DutyCycleValues> for DutyValues {
    fn from(v: &fanctl_config::DutyCycleValues) -> Self {
        match v {
            fanctl_config::DutyCycleValues::Auto => DutyValues::Generated,
            fanctl_config::DutyCycleValues::Explicit(values) => {
                DutyValues::Interior(values.clone())
            }
        }
    }
}

impl From<&fanctl_config::ControlCfg> for ControllerCfg {
    fn from(c: &fanctl_config::ControlCfg) -> Self {
        Self {
            duty_cycle_min: c.duty_cycle_min,
            duty_cycle_max: c.duty_cycle_max,
            thresholds: c.thresholds.clone(),
            duty_cycle_values: (&c.duty_cycle_values).into(),
            hysteresis: c.hysteresis,
            stuck_counter_limit: c.hysteresis_stuck_counter,
        }
    }
}
