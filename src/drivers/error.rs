use thiserror::Error;
use crate::types::PinId;
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DaqError {
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("pin {0} has no calibration data")]
    MissingCalibration(PinId),
    #[error("unknown pin {0}")]
    UnknownPin(PinId),
    #[error("pin {0} is already registered")]
    DuplicatePin(PinId),
    #[error("acquisition is already running")]
    AlreadyRunning,
    #[error("acquisition is not running")]
    NotRunning,
    #[error("a recording session is already open")]
    AlreadyRecording,
    #[error("no active recording session")]
    NoActiveSession,
    #[error("sample rate must be finite and greater than zero, got {0}")]
    InvalidSampleRate(f64),
    #[error("plot buffer capacity must be greater than zero")]
    InvalidCapacity,
    #[error("acquisition fault on pin {pin}: {reason}")]
    AcquisitionFault { pin: PinId, reason: String },
    #[error("recording I/O failure: {0}")]
    RecordingIOFailure(String),
    #[error("acquisition worker failed: {0}")]
    Worker(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}
impl DaqError {
    pub fn fault(pin: PinId, reason: impl Into<String>) -> Self {
        DaqError::AcquisitionFault {
            pin,
            reason: reason.into(),
        }
    }
}
impl From<std::io::Error> for DaqError {
    fn from(value: std::io::Error) -> Self {
        DaqError::RecordingIOFailure(value.to_string())
    }
}
