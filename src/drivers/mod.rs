// src/drivers/mod.rs
// 采集核心：通道表、标定、信号源、采集循环、绘图缓冲
pub mod buffer;
pub mod calibration;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod uldaq;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::PlotBuffer;
pub use calibration::{apply, unit_for, Calibration, CalibrationPoint};
pub use error::DaqError;
pub use pipeline::{AcquisitionCore, AcquisitionLoop, SampleSink, TickReport, MAX_CONSECUTIVE_FAULTS};
pub use registry::{Channel, ChannelRegistry, DEFAULT_ANALOG_PINS};
pub use source::{AnySource, SampleSource, ScriptedSource, SourceKind, SyntheticSource};
pub use uldaq::UldaqSource;
