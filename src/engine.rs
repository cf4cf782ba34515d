// src/engine.rs
// 控制通路：把通道表、信号源、采集循环、绘图缓冲和录制器接在一起
use std::sync::mpsc::Receiver;
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::drivers::{
    AcquisitionLoop, AnySource, CalibrationPoint, ChannelRegistry, PlotBuffer, SampleSource,
};
use crate::recorder::{Recorder, SessionHandle, SessionSummary};
use crate::state::StateStore;
use crate::types::{DaqEvent, Notifier, PinId};
const EVENT_QUEUE: usize = 256;
pub struct MonitorEngine {
    config: AppConfig,
    registry: ChannelRegistry,
    plot: PlotBuffer,
    acquisition: AcquisitionLoop<AnySource>,
    state_store: StateStore,
    source_status: String,
    events: Option<Receiver<DaqEvent>>,
}
impl MonitorEngine {
    /// Picks the source, restores saved channels (or the default layout) and
    /// wires everything up. Nothing is sampled until `start`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let source = AnySource::select(config.source, config.seed)
            .context("selecting sample source")?;
        let state_store = StateStore::new(config.state_file.clone());
        let registry = match state_store.load() {
            Ok(Some(registry)) => registry,
            Ok(None) => ChannelRegistry::with_default_pins(),
            Err(err) => {
                log::warn!("ignoring saved channel state: {err:#}");
                ChannelRegistry::with_default_pins()
            }
        };
        Self::assemble(config, source, registry, state_store)
    }
    pub fn with_parts(config: AppConfig, source: AnySource, registry: ChannelRegistry) -> Result<Self> {
        let state_store = StateStore::new(config.state_file.clone());
        Self::assemble(config, source, registry, state_store)
    }
    fn assemble(
        config: AppConfig,
        source: AnySource,
        registry: ChannelRegistry,
        state_store: StateStore,
    ) -> Result<Self> {
        config.validate()?;
        let (notifier, events) = Notifier::channel(EVENT_QUEUE);
        let registry = registry.with_notifier(notifier.clone());
        let plot = PlotBuffer::with_window(config.plot_window_seconds, config.sample_rate_hz)?;
        let recorder = Recorder::new(registry.clone(), config.application_name.clone());
        let source_status = source.describe();
        let acquisition = AcquisitionLoop::new(source, registry.clone(), plot.clone(), recorder, notifier);
        Ok(Self {
            config,
            registry,
            plot,
            acquisition,
            state_store,
            source_status,
            events: Some(events),
        })
    }
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }
    pub fn plot(&self) -> &PlotBuffer {
        &self.plot
    }
    pub fn source_status(&self) -> &str {
        &self.source_status
    }
    /// Hands the notification receiver to the presentation side (once).
    pub fn take_events(&mut self) -> Option<Receiver<DaqEvent>> {
        self.events.take()
    }
    pub fn is_running(&self) -> bool {
        self.acquisition.is_running()
    }
    pub fn start(&self) -> Result<()> {
        self.acquisition.start(self.config.sample_rate_hz)?;
        Ok(())
    }
    /// Stops sampling; an open recording is closed and its summary returned.
    pub fn stop(&self) -> Result<Option<SessionSummary>> {
        Ok(self.acquisition.stop()?)
    }
    pub fn start_recording(&self) -> Result<SessionHandle> {
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating {}", self.config.output_dir.display()))?;
        Ok(self.acquisition.begin_file_recording(&self.config.output_dir)?)
    }
    pub fn stop_recording(&self) -> Result<SessionSummary> {
        Ok(self.acquisition.end_recording()?)
    }
    /// Selects or deselects a pin; a deselected pin's plot trace is dropped.
    pub fn toggle_pin(&self, pin: PinId, active: bool) -> Result<()> {
        self.acquisition.toggle_active(pin, active)?;
        if !active {
            self.plot.clear(pin);
        }
        Ok(())
    }
    pub fn rename_pin(&self, pin: PinId, name: &str) -> Result<()> {
        Ok(self.registry.set_name(pin, name)?)
    }
    pub fn calibrate_pin(
        &self,
        pin: PinId,
        point_a: CalibrationPoint,
        point_b: CalibrationPoint,
        unit: &str,
    ) -> Result<()> {
        Ok(self.registry.set_calibration(pin, point_a, point_b, unit)?)
    }
    pub fn enable_calibration(&self, pin: PinId, enabled: bool) -> Result<()> {
        Ok(self.registry.enable_calibration(pin, enabled)?)
    }
    pub fn save_state(&self) -> Result<()> {
        self.state_store.save(&self.registry)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{DaqError, SyntheticSource};
    use crate::Sample;
    use std::time::Duration;
    fn engine(dir: &std::path::Path) -> MonitorEngine {
        let config = AppConfig {
            output_dir: dir.join("recordings"),
            state_file: dir.join("state.json"),
            sample_rate_hz: 200.0,
            ..AppConfig::default()
        };
        MonitorEngine::with_parts(
            config,
            AnySource::Synthetic(SyntheticSource::new(1)),
            ChannelRegistry::with_default_pins(),
        )
        .unwrap()
    }
    #[test]
    fn record_while_running_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        let events = engine.take_events().unwrap();
        engine.toggle_pin(1, true).unwrap();
        engine.toggle_pin(2, true).unwrap();
        let err = engine.start_recording().unwrap_err();
        assert_eq!(err.downcast_ref::<DaqError>(), Some(&DaqError::NotRunning));
        engine.start().unwrap();
        let handle = engine.start_recording().unwrap();
        std::thread::sleep(Duration::from_millis(150));
        let summary = engine.stop().unwrap().unwrap();
        assert!(summary.rows_written > 0);
        let path = handle.path.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let rows = text
            .lines()
            .filter(|l| !l.starts_with('#') && !l.starts_with("Timestamp"))
            .count();
        assert_eq!(rows as u64, summary.rows_written);
        assert!(!engine.is_running());
        let events: Vec<DaqEvent> = events.try_iter().collect();
        assert!(events.contains(&DaqEvent::AcquisitionStarted { sample_rate_hz: 200.0 }));
        assert!(events.contains(&DaqEvent::AcquisitionStopped));
        assert!(events.contains(&DaqEvent::ChannelChanged(1)));
    }
    #[test]
    fn deselecting_a_pin_clears_its_trace() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.toggle_pin(4, true).unwrap();
        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        engine.toggle_pin(4, false).unwrap();
        engine.stop().unwrap();
        assert!(engine.plot().window(4).is_empty());
    }
    #[test]
    fn recalibrating_while_running_applies_from_the_next_sample() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let kpa = |engine: &MonitorEngine, full_scale: f64| {
            engine
                .calibrate_pin(
                    5,
                    CalibrationPoint::new(0.0, 0.0),
                    CalibrationPoint::new(full_scale, 5.0),
                    "kPa",
                )
                .unwrap()
        };
        kpa(&engine, 1000.0);
        engine.toggle_pin(5, true).unwrap();
        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let last_before_edit = engine.plot().latest(5).expect("samples before the edit").index;
        kpa(&engine, 10.0);
        std::thread::sleep(Duration::from_millis(60));
        engine.stop().unwrap();
        let window = engine.plot().window(5);
        let (old, new): (Vec<&Sample>, Vec<&Sample>) = window
            .iter()
            .partition(|s| s.index <= last_before_edit);
        assert!(!old.is_empty() && !new.is_empty());
        for s in &old {
            assert!((s.calibrated - s.raw_voltage * 200.0).abs() < 1e-6, "{s:?}");
        }
        // The edit lands between ticks: every sample is one transform or the
        // other, and once the new one shows up the old one never returns.
        let mut switched = false;
        for s in &new {
            let is_new = (s.calibrated - s.raw_voltage * 2.0).abs() < 1e-6;
            let is_old = (s.calibrated - s.raw_voltage * 200.0).abs() < 1e-6;
            assert!(is_new || is_old, "{s:?}");
            if is_new && !is_old {
                switched = true;
            } else if switched {
                assert!(is_new, "old calibration after the edit: {s:?}");
            }
        }
        assert!(new.last().is_some_and(|s| (s.calibrated - s.raw_voltage * 2.0).abs() < 1e-6));
        engine.save_state().unwrap();
        assert!(dir.path().join("state.json").exists());
    }
}
