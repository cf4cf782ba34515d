//! Multi-channel analog sensor acquisition: per-channel calibration, a
//! bounded plot history and a CSV recorder fed from one sampling thread.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod recorder;
pub mod state;
pub mod types;
pub use config::AppConfig;
pub use engine::MonitorEngine;
pub use recorder::{Recorder, SessionHandle, SessionSummary};
pub use types::{DaqEvent, PinId, Sample};
