use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::drivers::calibration::{self, Calibration, CalibrationPoint};
use crate::drivers::DaqError;
use crate::types::{DaqEvent, Notifier, PinId};
/// Analog inputs of the default device layout.
pub const DEFAULT_ANALOG_PINS: [PinId; 8] = [1, 2, 4, 5, 7, 8, 10, 11];
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pin: PinId,
    pub name: String,
    /// Channel is an input that can be sampled at all.
    pub enabled: bool,
    /// Channel is currently selected for acquisition.
    pub active: bool,
    pub calibration: Option<Calibration>,
}
impl Channel {
    pub fn new(pin: PinId, name: impl Into<String>) -> Self {
        Self {
            pin,
            name: name.into(),
            enabled: true,
            active: false,
            calibration: None,
        }
    }
    pub fn pin(&self) -> PinId {
        self.pin
    }
    /// Sampled on the next tick.
    pub fn is_sampled(&self) -> bool {
        self.enabled && self.active
    }
    pub fn apply(&self, raw_voltage: f64) -> f64 {
        calibration::apply(raw_voltage, self.calibration.as_ref())
    }
    pub fn unit(&self) -> &str {
        calibration::unit_for(self.calibration.as_ref())
    }
}
/// Shared, cheaply clonable channel table.
///
/// Every channel is stored behind its own `Arc` and replaced wholesale on
/// mutation, so a snapshot taken by the acquisition thread is an immutable
/// copy that later edits cannot tear.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<BTreeMap<PinId, Arc<Channel>>>>,
    notifier: Notifier,
}
impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_default_pins() -> Self {
        let registry = Self::new();
        {
            let mut channels = registry.lock();
            for (i, pin) in DEFAULT_ANALOG_PINS.iter().copied().enumerate() {
                let channel = Channel::new(pin, format!("Pressure_{}", i + 1));
                channels.insert(pin, Arc::new(channel));
            }
        }
        registry
    }
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }
    fn lock(&self) -> MutexGuard<'_, BTreeMap<PinId, Arc<Channel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn add_channel(&self, pin: PinId, name: impl Into<String>) -> Result<(), DaqError> {
        self.insert(Channel::new(pin, name))
    }
    /// Inserts a fully configured channel, e.g. one restored from disk.
    pub fn insert(&self, channel: Channel) -> Result<(), DaqError> {
        let pin = channel.pin;
        {
            let mut channels = self.lock();
            if channels.contains_key(&pin) {
                return Err(DaqError::DuplicatePin(pin));
            }
            channels.insert(pin, Arc::new(channel));
        }
        self.notifier.notify(DaqEvent::ChannelChanged(pin));
        Ok(())
    }
    pub fn remove_channel(&self, pin: PinId) -> Result<Channel, DaqError> {
        let removed = self.lock().remove(&pin).ok_or(DaqError::UnknownPin(pin))?;
        self.notifier.notify(DaqEvent::ChannelChanged(pin));
        Ok(Arc::unwrap_or_clone(removed))
    }
    pub fn get(&self, pin: PinId) -> Result<Channel, DaqError> {
        self.lock()
            .get(&pin)
            .map(|c| Channel::clone(c))
            .ok_or(DaqError::UnknownPin(pin))
    }
    pub fn contains(&self, pin: PinId) -> bool {
        self.lock().contains_key(&pin)
    }
    /// All channels, ascending pin order.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.lock().values().cloned().collect()
    }
    /// Channels to sample this tick, ascending pin order.
    pub fn sampled_snapshot(&self) -> Vec<Arc<Channel>> {
        self.lock()
            .values()
            .filter(|c| c.is_sampled())
            .cloned()
            .collect()
    }
    pub fn set_name(&self, pin: PinId, name: impl Into<String>) -> Result<(), DaqError> {
        let name = name.into();
        self.update(pin, |c| {
            c.name = name;
            Ok(())
        })
    }
    /// Replaces the channel's calibration. Validation happens before anything
    /// is touched, so a rejected call leaves the previous calibration intact.
    pub fn set_calibration(
        &self,
        pin: PinId,
        point_a: CalibrationPoint,
        point_b: CalibrationPoint,
        unit: impl Into<String>,
    ) -> Result<(), DaqError> {
        let calibration = Calibration::new(point_a, point_b, unit)?;
        self.update(pin, |c| {
            c.calibration = Some(calibration);
            Ok(())
        })
    }
    pub fn enable_calibration(&self, pin: PinId, enabled: bool) -> Result<(), DaqError> {
        self.update(pin, |c| match c.calibration.take() {
            Some(cal) => {
                c.calibration = Some(cal.with_enabled(enabled));
                Ok(())
            }
            None if !enabled => Ok(()),
            None => Err(DaqError::MissingCalibration(pin)),
        })
    }
    pub fn clear_calibration(&self, pin: PinId) -> Result<(), DaqError> {
        self.update(pin, |c| {
            c.calibration = None;
            Ok(())
        })
    }
    pub fn toggle_active(&self, pin: PinId, active: bool) -> Result<(), DaqError> {
        self.update(pin, |c| {
            c.active = active;
            Ok(())
        })
    }
    pub fn set_enabled(&self, pin: PinId, enabled: bool) -> Result<(), DaqError> {
        self.update(pin, |c| {
            c.enabled = enabled;
            Ok(())
        })
    }
    fn update<F>(&self, pin: PinId, edit: F) -> Result<(), DaqError>
    where
        F: FnOnce(&mut Channel) -> Result<(), DaqError>,
    {
        {
            let mut channels = self.lock();
            let current = channels.get(&pin).ok_or(DaqError::UnknownPin(pin))?;
            let mut next = Channel::clone(current);
            edit(&mut next)?;
            channels.insert(pin, Arc::new(next));
        }
        self.notifier.notify(DaqEvent::ChannelChanged(pin));
        Ok(())
    }
}
