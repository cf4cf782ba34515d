// src/state.rs
// 通道配置的保存/加载（采集核心本身不做持久化）
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use crate::drivers::{Calibration, CalibrationPoint, Channel, ChannelRegistry};
use crate::types::PinId;
const STATE_VERSION: &str = "1.0";
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: String,
    timestamp: String,
    pin_configs: Vec<PinState>,
}
#[derive(Debug, Serialize, Deserialize)]
struct PinState {
    pin_number: PinId,
    name: String,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calibration: Option<CalibrationState>,
}
#[derive(Debug, Serialize, Deserialize)]
struct CalibrationState {
    point1: CalibrationPoint,
    point2: CalibrationPoint,
    unit: String,
    enabled: bool,
}
pub struct StateStore {
    path: PathBuf,
}
impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn save(&self, registry: &ChannelRegistry) -> Result<()> {
        let state = StateFile {
            version: STATE_VERSION.to_owned(),
            timestamp: Local::now().to_rfc3339(),
            pin_configs: registry
                .channels()
                .iter()
                .map(|c| PinState {
                    pin_number: c.pin(),
                    name: c.name.clone(),
                    enabled: c.enabled,
                    calibration: c.calibration.as_ref().map(|cal| CalibrationState {
                        point1: cal.point_a(),
                        point2: cal.point_b(),
                        unit: cal.unit().to_owned(),
                        enabled: cal.is_enabled(),
                    }),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        log::info!("channel state saved to {}", self.path.display());
        Ok(())
    }
    /// Builds a registry from the saved file, or `None` when there is none.
    /// Channels come back inactive.
    pub fn load(&self) -> Result<Option<ChannelRegistry>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let state: StateFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        if state.version != STATE_VERSION {
            log::warn!(
                "state file version {} (expected {STATE_VERSION}), loading anyway",
                state.version
            );
        }
        let registry = ChannelRegistry::new();
        for pin in state.pin_configs {
            let mut channel = Channel::new(pin.pin_number, pin.name);
            channel.enabled = pin.enabled;
            if let Some(cal) = pin.calibration {
                match Calibration::new(cal.point1, cal.point2, cal.unit) {
                    Ok(c) => channel.calibration = Some(c.with_enabled(cal.enabled)),
                    Err(err) => log::warn!("pin {}: dropping saved calibration: {err}", pin.pin_number),
                }
            }
            if let Err(err) = registry.insert(channel) {
                log::warn!("skipping saved channel: {err}");
            }
        }
        Ok(Some(registry))
    }
}
