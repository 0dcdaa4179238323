#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core fan control logic (hardware-agnostic).
//!
//! All hardware interactions go through the `fanctl_traits` seams
//! (`PulseSource`, `PwmOutput`, `Thermometer`, `Clock`).
//!
//! ## Architecture
//!
//! - **Tachometer**: `PulseRateEstimator` turns rising edges into a smoothed rpm (`tach`)
//! - **Control**: `DutyCycleController` maps temperature to a duty cycle with hysteresis (`controller`)
//! - **Table**: threshold bands and their duty cycles (`table`)
//! - **Driver**: `FanLoop` runs one evaluation per period (`runner`)
//! - **Export**: latest values to a local JSON file (`export`)
//!
//! The estimator and the controller never call each other.

pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod export;
pub mod hw_error;
pub mod mocks;
pub mod runner;
pub mod table;
pub mod tach;

pub use config::{ControllerCfg, DutyValues, TachCfg};
pub use controller::{DutyCycle, DutyCycleController};
pub use error::{BuildError, FanError};
pub use export::{ExportedValues, LocalExport};
pub use runner::{CycleReport, FanLoop, ReportSink};
pub use table::{DutyCycleTable, duty_cycle_percent};
pub use tach::{PulseRateEstimator, TachState, WATCHDOG_TIMEOUT};
