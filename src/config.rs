// src/config.rs
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::drivers::SourceKind;
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub application_name: String,
    pub sample_rate_hz: f64,
    /// Seconds of history kept per channel for plotting.
    pub plot_window_seconds: f64,
    pub source: SourceKind,
    pub seed: u64,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub run_seconds: f64,
    pub record: bool,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application_name: "DAQ".to_owned(),
            sample_rate_hz: 100.0,
            plot_window_seconds: 10.0,
            source: SourceKind::Auto,
            seed: 0x5EED,
            output_dir: PathBuf::from("."),
            state_file: PathBuf::from("daq_config.json"),
            run_seconds: 10.0,
            record: true,
        }
    }
}
impl AppConfig {
    /// Reads a JSON config; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            bail!("sample_rate_hz must be positive, got {}", self.sample_rate_hz);
        }
        if !(self.plot_window_seconds.is_finite() && self.plot_window_seconds > 0.0) {
            bail!(
                "plot_window_seconds must be positive, got {}",
                self.plot_window_seconds
            );
        }
        if !(self.run_seconds.is_finite() && self.run_seconds >= 0.0) {
            bail!("run_seconds must not be negative, got {}", self.run_seconds);
        }
        Ok(())
    }
}
