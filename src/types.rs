// src/types.rs
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Physical analog input identifier, stable for the lifetime of a channel.
pub type PinId = u32;

/// One timestamped reading for one channel at one tick.
///
/// Samples are plain `Copy` values: every subscriber gets its own copy and
/// nothing downstream can observe a partially written reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub pin: PinId,
    pub timestamp: SystemTime,
    pub raw_voltage: f64,
    pub calibrated: f64,
    pub index: u64,
}
impl Sample {
    pub fn unix_seconds(&self) -> f64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

// 后台发给展示层的通知
#[derive(Clone, Debug, PartialEq)]
pub enum DaqEvent {
    ChannelChanged(PinId),
    ChannelAutoDisabled { pin: PinId, faults: u32 },
    AcquisitionStarted { sample_rate_hz: f64 },
    AcquisitionStopped,
    RecordingFailed(String),
}

/// Fire-and-forget notification outlet. A full queue drops the notification;
/// samples never travel through here.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    tx: Option<SyncSender<DaqEvent>>,
}
impl Notifier {
    pub fn new(tx: SyncSender<DaqEvent>) -> Self {
        Self { tx: Some(tx) }
    }
    /// Bounded notification channel with room for `capacity` pending events.
    pub fn channel(capacity: usize) -> (Self, Receiver<DaqEvent>) {
        let (tx, rx) = sync_channel(capacity);
        (Self::new(tx), rx)
    }
    pub fn disconnected() -> Self {
        Self { tx: None }
    }
    pub fn notify(&self, event: DaqEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::debug!("notification queue full, dropping {event:?}");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
