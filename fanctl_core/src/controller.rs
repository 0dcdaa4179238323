//! Temperature to duty-cycle mapping with hysteresis.
//!
//! A duty cycle above the floor is "elevated": on later calls it is held
//! until the temperature leaves its band (downward by at least the
//! hysteresis margin, or upward past the band's own threshold). A counter
//! bounds how long a held value can survive without being re-evaluated.

use tracing::{debug, trace};

use crate::config::ControllerCfg;
use crate::error::BuildError;
use crate::table::{DutyCycleTable, duty_cycle_percent};

/// One controller decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    /// PWM level, 0..=255.
    pub value: u8,
    /// `value` as a percentage of full scale.
    pub percent: u8,
}

impl DutyCycle {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            percent: duty_cycle_percent(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DutyCycleController {
    table: DutyCycleTable,
    hysteresis: f64,
    stuck_counter_limit: u32,

    current_duty_cycle: u8,
    in_elevated_state: bool,
    stuck_counter: u32,
}

impl DutyCycleController {
    pub fn new(cfg: ControllerCfg) -> Result<Self, BuildError> {
        if !(cfg.hysteresis.is_finite() && cfg.hysteresis >= 0.0) {
            return Err(BuildError::InvalidHysteresis(cfg.hysteresis));
        }
        let table = DutyCycleTable::from_cfg(&cfg)?;
        debug!(
            thresholds = ?table.thresholds(),
            values = ?table.values(),
            hysteresis = cfg.hysteresis,
            stuck_counter_limit = cfg.stuck_counter_limit,
            "duty cycle controller ready"
        );
        Ok(Self::with_table(
            table,
            cfg.hysteresis,
            cfg.stuck_counter_limit,
        ))
    }

    /// Build from an already validated table.
    ///
    /// A negative or NaN `hysteresis` is treated as 0.
    pub fn with_table(table: DutyCycleTable, hysteresis: f64, stuck_counter_limit: u32) -> Self {
        Self {
            table,
            hysteresis: if hysteresis >= 0.0 { hysteresis } else { 0.0 },
            stuck_counter_limit,
            current_duty_cycle: 0,
            in_elevated_state: false,
            stuck_counter: 0,
        }
    }

    /// Decide the duty cycle for `temperature` (°C) and remember it.
    pub fn get_duty_cycle(&mut self, temperature: f64) -> DutyCycle {
        if self.in_elevated_state {
            if self.band_exited(temperature) {
                debug!(
                    temperature,
                    held = self.current_duty_cycle,
                    "temperature left the held band"
                );
                self.in_elevated_state = false;
                self.stuck_counter = 0;
            } else {
                self.stuck_counter = self.stuck_counter.saturating_add(1);
                if self.stuck_counter > self.stuck_counter_limit {
                    debug!(
                        temperature,
                        held = self.current_duty_cycle,
                        limit = self.stuck_counter_limit,
                        "held band for too long, re-evaluating"
                    );
                    self.in_elevated_state = false;
                    self.stuck_counter = 0;
                } else {
                    trace!(
                        temperature,
                        held = self.current_duty_cycle,
                        stuck_counter = self.stuck_counter,
                        "holding duty cycle"
                    );
                    return DutyCycle::new(self.current_duty_cycle);
                }
            }
        }

        let value = self
            .direct_value(temperature)
            .unwrap_or(self.current_duty_cycle);
        if value > self.table.floor() {
            self.in_elevated_state = true;
            self.stuck_counter = 0;
        }
        if value != self.current_duty_cycle {
            debug!(
                temperature,
                from = self.current_duty_cycle,
                to = value,
                "duty cycle changed"
            );
        }
        self.current_duty_cycle = value;
        DutyCycle::new(value)
    }

    /// Whether `temperature` is outside the band the held value came from.
    /// The first band whose value matches the held one decides.
    fn band_exited(&self, temperature: f64) -> bool {
        let thresholds = self.table.thresholds();
        let values = self.table.values();
        let last = values.len() - 1;
        values.iter().enumerate().any(|(i, &v)| {
            if v != self.current_duty_cycle {
                return false;
            }
            if i == last {
                // Top band: nothing above to escape to.
                return temperature <= thresholds[last - 1] - self.hysteresis;
            }
            let below = i > 0 && temperature <= thresholds[i - 1] - self.hysteresis;
            below || temperature >= thresholds[i]
        })
    }

    /// Band value for `temperature`, or `None` when no band matches
    /// (NaN, or exactly on a lone threshold).
    fn direct_value(&self, temperature: f64) -> Option<u8> {
        let thresholds = self.table.thresholds();
        let values = self.table.values();
        let first = thresholds[0];
        let last = thresholds[thresholds.len() - 1];
        if temperature < first {
            return Some(values[0]);
        }
        if temperature > last {
            return Some(values[values.len() - 1]);
        }
        thresholds
            .windows(2)
            .position(|w| w[0] <= temperature && temperature <= w[1])
            .map(|i| values[i + 1])
    }

    pub fn current_duty_cycle(&self) -> u8 {
        self.current_duty_cycle
    }

    pub fn is_elevated(&self) -> bool {
        self.in_elevated_state
    }

    pub fn stuck_counter(&self) -> u32 {
        self.stuck_counter
    }

    pub fn table(&self) -> &DutyCycleTable {
        &self.table
    }

    /// Drop any held band so the next call evaluates directly.
    pub fn reset_hysteresis(&mut self) {
        self.in_elevated_state = false;
        self.stuck_counter = 0;
    }
}
