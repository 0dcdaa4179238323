//! DS18B20 temperature sensor through the Linux 1-Wire sysfs interface.
//!
//! The kernel exposes each sensor as a `w1_slave` file with two lines:
//!
//! ```text
//! 59 01 4b 46 7f ff 07 10 a2 : crc=a2 YES
//! 59 01 4b 46 7f ff 07 10 a2 t=21562
//! ```
//!
//! The first line ends in `YES` when the CRC matched; the second carries the
//! temperature in millidegrees Celsius.
use std::path::{Path, PathBuf};

use fanctl_traits::Thermometer;

use crate::error::{HwError, Result};

/// Parse the contents of a `w1_slave` file into degrees Celsius.
pub fn parse_w1_slave(content: &str) -> Result<f64> {
    let mut lines = content.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| HwError::Malformed("empty reading".into()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(HwError::CrcMismatch);
    }
    let data_line = lines
        .next()
        .ok_or_else(|| HwError::Malformed("missing data line".into()))?;
    let (_, milli) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| HwError::Malformed(format!("no temperature field in {data_line:?}")))?;
    let milli: i64 = milli
        .trim()
        .parse()
        .map_err(|e| HwError::Malformed(format!("temperature {milli:?}: {e}")))?;
    Ok(milli as f64 / 1000.0)
}

/// Reads a DS18B20 through its `w1_slave` file on every call.
#[derive(Debug, Clone)]
pub struct W1Thermometer {
    path: PathBuf,
}

impl W1Thermometer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<f64> {
        let content = std::fs::read_to_string(&self.path)?;
        let celsius = parse_w1_slave(&content)?;
        tracing::trace!(celsius, path = %self.path.display(), "w1 sample");
        Ok(celsius)
    }
}

impl Thermometer for W1Thermometer {
    fn read_celsius(&mut self) -> std::result::Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.read()?)
    }
}
