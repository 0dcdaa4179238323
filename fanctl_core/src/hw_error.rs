//! Maps `Box<dyn Error>` from trait boundaries to typed `FanError`.
//!
//! The traits in `fanctl_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `fanctl_hardware::HwError` downcasting.

use crate::error::FanError;

/// Which hardware seam produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seam {
    Thermometer,
    Pwm,
    Tach,
}

/// Map a trait-boundary error to a typed `FanError`.
///
/// Every thermometer failure is a `Sensor` error, whatever its cause, so the
/// driver loop can skip the cycle. For the other seams known hardware error
/// types are downcast first; anything else is attributed to the seam.
pub fn map_hw_error(seam: Seam, e: &(dyn std::error::Error + 'static)) -> FanError {
    if seam == Seam::Thermometer {
        return FanError::Sensor(e.to_string());
    }

    #[cfg(feature = "hardware-errors")]
    {
        use fanctl_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(io) => FanError::Io(io.to_string()),
                HwError::CrcMismatch | HwError::Malformed(_) => FanError::Sensor(hw.to_string()),
                other => FanError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    match seam {
        Seam::Thermometer => FanError::Sensor(s),
        Seam::Pwm => FanError::Pwm(s),
        Seam::Tach => FanError::Tach(s),
    }
}
