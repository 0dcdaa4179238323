use thiserror::Error;

/// Runtime faults surfaced by the driver loop. The estimator and controller
/// never return these from their steady-state calls.
#[derive(Debug, Error, Clone)]
pub enum FanError {
    #[error("temperature sensor error: {0}")]
    Sensor(String),
    #[error("pwm error: {0}")]
    Pwm(String),
    #[error("tachometer error: {0}")]
    Tach(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Inconsistent configuration, rejected before any evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("thresholds must contain at least one temperature")]
    EmptyThresholds,
    #[error("threshold {0} is not a finite number")]
    NonFiniteThreshold(f64),
    #[error("thresholds must be strictly increasing (index {0})")]
    ThresholdsNotIncreasing(usize),
    #[error("expected {expected} duty cycle values for the thresholds, got {got}")]
    ValueCountMismatch { expected: usize, got: usize },
    #[error("duty_cycle_min {min} is above duty_cycle_max {max}")]
    MinAboveMax { min: u8, max: u8 },
    #[error("hysteresis must be a finite number >= 0, got {0}")]
    InvalidHysteresis(f64),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, FanError>;
