#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the fan controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated once.
//! - Paths accept a leading `~` and `$VAR` / `${VAR}` references.
use serde::Deserialize;
use serde::de::Deserializer;
use std::path::{Path, PathBuf};

/// Largest BCM GPIO number on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Tachometer input (open collector, pulled up).
    pub rpm_gpio: u8,
    /// PWM output to the fan's control wire.
    pub pwm_gpio: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TachCfg {
    pub pulses_per_revolution: f64,
    /// Weight of the previous period in the smoothing filter; clamped to [0.0, 0.99].
    pub weighting: f64,
    /// Readings below this report 0 rpm; clamped to [1.0, 1000.0].
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

/// Duty cycle per temperature band.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DutyCycleValues {
    /// Evenly spaced between `duty_cycle_min` and `duty_cycle_max`.
    #[default]
    Auto,
    /// Interior bands only; min and max are added at both ends.
    Explicit(Vec<u8>),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    pub duty_cycle_min: u8,
    pub duty_cycle_max: u8,
    /// Temperatures in °C, strictly increasing.
    pub thresholds: Vec<f64>,
    /// Either the string "auto" or a list of integers.
    #[serde(deserialize_with = "de_duty_cycle_values")]
    pub duty_cycle_values: DutyCycleValues,
    /// Margin in °C below a band before the fan is allowed to slow down.
    pub hysteresis: f64,
    /// Evaluations held in a band before forcing re-evaluation.
    pub hysteresis_stuck_counter: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            duty_cycle_min: 50,
            duty_cycle_max: 255,
            thresholds: vec![22.0, 24.0, 26.0, 28.0],
            duty_cycle_values: DutyCycleValues::Auto,
            hysteresis: 2.0,
            hysteresis_stuck_counter: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DutyCycleValuesToml {
    Keyword(String),
    List(Vec<u8>),
}

fn de_duty_cycle_values<'de, D>(deserializer: D) -> Result<DutyCycleValues, D::Error>
where
    D: Deserializer<'de>,
{
    match DutyCycleValuesToml::deserialize(deserializer)? {
        DutyCycleValuesToml::Keyword(k) if k.eq_ignore_ascii_case("auto") => {
            Ok(DutyCycleValues::Auto)
        }
        DutyCycleValuesToml::Keyword(k) => Err(serde::de::Error::custom(format!(
            "duty_cycle_values must be \"auto\" or a list of integers, got {k:?}"
        ))),
        DutyCycleValuesToml::List(v) => Ok(DutyCycleValues::Explicit(v)),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SensorCfg {
    /// DS18B20 `w1_slave` file, e.g. /sys/bus/w1/devices/28-xxxx/w1_slave
    pub path_temperature_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Seconds between two evaluation cycles.
    pub loop_duration_s: f64,
    /// PWM carrier frequency; 4-pin fans expect 25 kHz.
    pub pwm_frequency_hz: f64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            loop_duration_s: 30.0,
            pwm_frequency_hz: 25_000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExportCfg {
    pub enable_local_export: bool,
    pub path_export_file: Option<String>,
    pub enable_prometheus_exporter: bool,
    pub prometheus_port: u16,
}

impl Default for ExportCfg {
    fn default() -> Self {
        Self {
            enable_local_export: false,
            path_export_file: None,
            enable_prometheus_exporter: false,
            prometheus_port: 9101,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub tach: TachCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub sensor: SensorCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub export: ExportCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references. Unknown variables are left as-is.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut s = raw.to_string();
    if s == "~" || s.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            s.replace_range(..1, &home);
        }
    }
    if !s.contains('$') {
        return PathBuf::from(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => ("", after),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        match std::env::var(name) {
            Ok(val) if !name.is_empty() => out.push_str(&val),
            _ => out.push_str(&rest[pos..rest.len() - tail.len()]),
        }
        rest = tail;
    }
    out.push_str(rest);
    PathBuf::from(out)
}

impl Config {
    pub fn temperature_path(&self) -> Option<PathBuf> {
        self.sensor.path_temperature_file.as_deref().map(expand_path)
    }

    pub fn export_path(&self) -> Option<PathBuf> {
        self.export.path_export_file.as_deref().map(expand_path)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.rpm_gpio > MAX_BCM_PIN || self.pins.pwm_gpio > MAX_BCM_PIN {
            eyre::bail!("pins must be BCM numbers in 0..={MAX_BCM_PIN}");
        }
        if self.pins.rpm_gpio == self.pins.pwm_gpio {
            eyre::bail!("pins.rpm_gpio and pins.pwm_gpio must differ");
        }

        // Tach
        if !(self.tach.pulses_per_revolution.is_finite() && self.tach.pulses_per_revolution > 0.0)
        {
            eyre::bail!("tach.pulses_per_revolution must be > 0");
        }
        if !self.tach.weighting.is_finite() {
            eyre::bail!("tach.weighting must be a finite number");
        }
        if !self.tach.min_rpm.is_finite() {
            eyre::bail!("tach.min_rpm must be a finite number");
        }

        // Control
        let c = &self.control;
        if c.thresholds.is_empty() {
            eyre::bail!("control.thresholds must contain at least one temperature");
        }
        if c.thresholds.iter().any(|t| !t.is_finite()) {
            eyre::bail!("control.thresholds must be finite numbers");
        }
        if c.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            eyre::bail!("control.thresholds must be strictly increasing");
        }
        if c.duty_cycle_min > c.duty_cycle_max {
            eyre::bail!("control.duty_cycle_min must be <= control.duty_cycle_max");
        }
        if let DutyCycleValues::Explicit(values) = &c.duty_cycle_values
            && values.len() + 1 != c.thresholds.len()
        {
            eyre::bail!(
                "control.duty_cycle_values needs {} entries for {} thresholds (min and max are added), got {}",
                c.thresholds.len() - 1,
                c.thresholds.len(),
                values.len()
            );
        }
        if !(c.hysteresis.is_finite() && c.hysteresis >= 0.0) {
            eyre::bail!("control.hysteresis must be >= 0");
        }

        // Runner
        if !(self.runner.loop_duration_s.is_finite() && self.runner.loop_duration_s > 0.0) {
            eyre::bail!("runner.loop_duration_s must be > 0");
        }
        if self.runner.loop_duration_s > 24.0 * 60.0 * 60.0 {
            eyre::bail!("runner.loop_duration_s is unreasonably large (>24h)");
        }
        if !(self.runner.pwm_frequency_hz.is_finite() && self.runner.pwm_frequency_hz > 0.0) {
            eyre::bail!("runner.pwm_frequency_hz must be > 0");
        }

        // Export
        if self.export.enable_local_export && self.export.path_export_file.is_none() {
            eyre::bail!("export.path_export_file is required when export.enable_local_export = true");
        }
        if self.export.enable_prometheus_exporter && self.export.prometheus_port == 0 {
            eyre::bail!("export.prometheus_port must be >= 1");
        }

        Ok(())
    }
}
