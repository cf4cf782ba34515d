// src/main.rs
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use anyhow::Result;
use daq_monitor::{AppConfig, DaqEvent, MonitorEngine};
// 入口函数：无界面运行一次采集 + 录制
fn main() -> Result<()> {
    env_logger::init();
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("daq_monitor.json"));
    let config = AppConfig::load(&config_path)?;
    let mut engine = MonitorEngine::from_config(config.clone())?;
    let events = engine.take_events();
    println!("Source: {}", engine.source_status());
    let pins: Vec<_> = engine
        .registry()
        .channels()
        .iter()
        .filter(|c| c.enabled)
        .map(|c| c.pin())
        .collect();
    for pin in &pins {
        engine.toggle_pin(*pin, true)?;
    }
    engine.start()?;
    if config.record {
        let handle = engine.start_recording()?;
        if let Some(path) = &handle.path {
            println!("💾 Recording to {}", path.display());
        }
    }
    // 运行期间转发通知
    let deadline = Instant::now() + Duration::from_secs_f64(config.run_seconds);
    if let Some(events) = &events {
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match events.recv_timeout(left) {
                Ok(DaqEvent::ChannelAutoDisabled { pin, faults }) => {
                    println!("⚠️ Pin {pin} disabled after {faults} faults");
                }
                Ok(DaqEvent::RecordingFailed(reason)) => println!("❌ Recording stopped: {reason}"),
                Ok(other) => log::debug!("{other:?}"),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(left);
                    break;
                }
            }
        }
    } else {
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
    }
    match engine.stop()? {
        Some(summary) => println!(
            "💾 Recording saved: {} rows in {:.1} s{}",
            summary.rows_written,
            summary.duration.as_secs_f64(),
            summary.failure.map(|f| format!(" (failed: {f})")).unwrap_or_default()
        ),
        None => println!("🛑 Acquisition stopped"),
    }
    for channel in engine.registry().channels() {
        if let Some(sample) = engine.plot().latest(channel.pin()) {
            println!(
                "Pin {:>2} {:<12} {:>10.4} V  {:>10.4} {}",
                channel.pin(),
                channel.name,
                sample.raw_voltage,
                sample.calibrated,
                channel.unit()
            );
        }
    }
    engine.save_state()?;
    Ok(())
}
