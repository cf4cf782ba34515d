use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use crate::drivers::pipeline::SampleSink;
use crate::drivers::DaqError;
use crate::types::{PinId, Sample};
/// Rolling per-channel history of recent samples for display.
///
/// One writer (the acquisition thread) and any number of readers share it;
/// readers get copies, so they never see a half-written sample.
#[derive(Clone)]
pub struct PlotBuffer {
    per_channel: Arc<RwLock<HashMap<PinId, VecDeque<Sample>>>>,
    capacity: usize,
}
impl PlotBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, DaqError> {
        if capacity == 0 {
            return Err(DaqError::InvalidCapacity);
        }
        Ok(Self {
            per_channel: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        })
    }
    /// Capacity covering `window_seconds` of history at `sample_rate_hz`.
    pub fn with_window(window_seconds: f64, sample_rate_hz: f64) -> Result<Self, DaqError> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(DaqError::InvalidSampleRate(sample_rate_hz));
        }
        let samples = (window_seconds * sample_rate_hz).ceil();
        if !(samples.is_finite() && samples >= 1.0) {
            return Err(DaqError::InvalidCapacity);
        }
        Self::with_capacity(samples as usize)
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PinId, VecDeque<Sample>>> {
        self.per_channel.read().unwrap_or_else(PoisonError::into_inner)
    }
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PinId, VecDeque<Sample>>> {
        self.per_channel.write().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn push(&self, sample: Sample) {
        let mut channels = self.write();
        // Grows with use; `capacity` may be far larger than what a run fills.
        let queue = channels.entry(sample.pin).or_default();
        // A lower index means a new acquisition run started; drop the old trace.
        if queue.back().is_some_and(|last| sample.index < last.index) {
            queue.clear();
        }
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(sample);
    }
    /// Current contents for `pin`, oldest first.
    pub fn window(&self, pin: PinId) -> Vec<Sample> {
        self.read()
            .get(&pin)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }
    pub fn latest(&self, pin: PinId) -> Option<Sample> {
        self.read().get(&pin).and_then(|q| q.back().copied())
    }
    pub fn len(&self, pin: PinId) -> usize {
        self.read().get(&pin).map_or(0, VecDeque::len)
    }
    pub fn pins(&self) -> Vec<PinId> {
        let mut pins: Vec<PinId> = self.read().keys().copied().collect();
        pins.sort_unstable();
        pins
    }
    pub fn clear(&self, pin: PinId) {
        self.write().remove(&pin);
    }
    pub fn clear_all(&self) {
        self.write().clear();
    }
}
impl SampleSink for PlotBuffer {
    fn on_sample(&self, sample: &Sample) -> Result<(), DaqError> {
        self.push(*sample);
        Ok(())
    }
}
