//! Human-readable error descriptions and structured JSON error formatting.

use fanctl_core::error::{BuildError, FanError};
use fanctl_hardware::error::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::EmptyThresholds => {
                "What happened: No temperature thresholds are configured.\nLikely causes: control.thresholds is an empty list.\nHow to fix: Set control.thresholds to at least one temperature, e.g. [22, 24, 26, 28].".to_string()
            }
            BuildError::ThresholdsNotIncreasing(_) | BuildError::NonFiniteThreshold(_) => format!(
                "What happened: Invalid temperature thresholds ({be}).\nLikely causes: Thresholds out of order, duplicated, or not numbers.\nHow to fix: List control.thresholds in strictly increasing order."
            ),
            BuildError::ValueCountMismatch { .. } => format!(
                "What happened: Duty cycle values do not match the thresholds ({be}).\nLikely causes: control.duty_cycle_values has the wrong number of entries.\nHow to fix: Give one value fewer than there are thresholds, or use \"auto\"."
            ),
            BuildError::MinAboveMax { .. } => format!(
                "What happened: {be}.\nLikely causes: duty_cycle_min and duty_cycle_max swapped.\nHow to fix: Make control.duty_cycle_min <= control.duty_cycle_max (both 0..=255)."
            ),
            BuildError::InvalidHysteresis(_) => format!(
                "What happened: {be}.\nLikely causes: A negative or missing control.hysteresis.\nHow to fix: Set control.hysteresis to a margin in °C such as 2.0."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/fanctl.toml for a sample."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FanError>() {
        return match fe {
            FanError::Sensor(_) => format!(
                "What happened: {fe}.\nLikely causes: DS18B20 not wired, 1-Wire overlay not enabled, or a CRC failure.\nHow to fix: Check sensor.path_temperature_file exists and contains a 'YES' CRC line."
            ),
            FanError::Pwm(_) => format!(
                "What happened: {fe}.\nLikely causes: Wrong pins.pwm_gpio or missing GPIO permissions.\nHow to fix: Fix [pins] in the config; run as a user in the gpio group."
            ),
            FanError::Tach(_) => format!(
                "What happened: {fe}.\nLikely causes: Wrong pins.rpm_gpio, or the pin is already in use.\nHow to fix: Fix [pins] in the config and make sure no other process holds the pin."
            ),
            FanError::Hardware(_) | FanError::Io(_) => format!(
                "What happened: {fe}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Hardware initialization failed ({hw}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing file.\nHow to fix: Pass --config <FILE> (default etc/fanctl.toml). Original: {msg}"
        );
    }

    if lower.starts_with("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: Typo in a key, wrong value type, or missing [pins].\nHow to fix: Compare with etc/fanctl.toml. Original: {msg}"
        );
    }

    if lower.contains("pins") && (lower.contains("bcm") || lower.contains("differ")) {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: pins.rpm_gpio / pins.pwm_gpio out of range or equal.\nHow to fix: Use two different BCM GPIO numbers, e.g. rpm_gpio = 24, pwm_gpio = 18."
        );
    }

    if lower.starts_with("control.")
        || lower.starts_with("tach.")
        || lower.starts_with("runner.")
        || lower.starts_with("export.")
    {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Missing or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error family; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    if let Some(fe) = err.downcast_ref::<FanError>() {
        return match fe {
            FanError::Pwm(_) => 4,
            FanError::Sensor(_) => 5,
            FanError::Tach(_) | FanError::Hardware(_) => 6,
            FanError::Io(_) => 7,
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return 6;
    }
    1
}

/// Machine-readable name of the error family.
pub fn error_kind(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    if let Some(fe) = err.downcast_ref::<FanError>() {
        return match fe {
            FanError::Sensor(_) => "Sensor",
            FanError::Pwm(_) => "Pwm",
            FanError::Tach(_) => "Tach",
            FanError::Hardware(_) => "Hardware",
            FanError::Io(_) => "Io",
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return "Hardware";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": error_kind(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
