//! Local file export of the latest cycle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::trace;

use crate::error::FanError;
use crate::runner::{CycleReport, ReportSink};

/// Values written by [`LocalExport`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportedValues {
    pub temperature: f64,
    pub rpm: u32,
    pub duty_cycle: u8,
}

impl From<&CycleReport> for ExportedValues {
    fn from(r: &CycleReport) -> Self {
        Self {
            temperature: r.temperature,
            rpm: r.rpm,
            duty_cycle: r.duty_cycle.value,
        }
    }
}

/// Overwrites one JSON file with the latest values every cycle.
#[derive(Debug, Clone)]
pub struct LocalExport {
    path: PathBuf,
}

impl LocalExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, values: &ExportedValues) -> Result<(), FanError> {
        let bytes = serde_json::to_vec(values).map_err(|e| FanError::Io(e.to_string()))?;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .map_err(|e| FanError::Io(format!("create {}: {e}", dir.display())))?;
        }
        write_atomic(&self.path, &bytes)
            .map_err(|e| FanError::Io(format!("write {}: {e}", self.path.display())))?;
        trace!(path = %self.path.display(), "exported values");
        Ok(())
    }
}

impl ReportSink for LocalExport {
    fn publish(&mut self, report: &CycleReport) -> Result<(), FanError> {
        self.write(&report.into())
    }
}

/// Readers see either the previous or the new file, never a partial one.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
