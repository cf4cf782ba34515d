use std::collections::{HashMap, VecDeque};
use std::f64::consts::TAU;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::drivers::uldaq::UldaqSource;
use crate::drivers::DaqError;
use crate::types::PinId;
/// Lower bound of the synthetic voltage range.
pub const SYNTH_MIN_VOLTS: f64 = 0.0;
/// Upper bound of the synthetic voltage range.
pub const SYNTH_MAX_VOLTS: f64 = 5.0;
const SYNTH_CENTER_VOLTS: f64 = 2.5;
const SYNTH_AMPLITUDE_VOLTS: f64 = 1.5;
const WALK_STEP_VOLTS: f64 = 0.05;
const WALK_LIMIT_VOLTS: f64 = 1.0;
/// Something that can produce one raw voltage reading per channel on demand.
pub trait SampleSource: Send {
    fn next(&mut self, pin: PinId, elapsed_seconds: f64) -> Result<f64, DaqError>;
    fn is_available(&self) -> bool {
        true
    }
    /// Called by the acquisition loop before the first tick of a run.
    fn open(&mut self) -> Result<(), DaqError> {
        Ok(())
    }
    /// Called by the acquisition loop after the last tick of a run.
    fn close(&mut self) {}
    fn describe(&self) -> String;
}
impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next(&mut self, pin: PinId, elapsed_seconds: f64) -> Result<f64, DaqError> {
        (**self).next(pin, elapsed_seconds)
    }
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn open(&mut self) -> Result<(), DaqError> {
        (**self).open()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
}
struct WalkState {
    rng: StdRng,
    frequency_hz: f64,
    phase: f64,
    walk: f64,
}
/// Deterministic generator: a per-pin sine plus a bounded random walk.
///
/// Every pin owns an RNG seeded from `(seed, pin)`, so the same seed and the
/// same sequence of calls reproduce the same readings.
pub struct SyntheticSource {
    seed: u64,
    pins: HashMap<PinId, WalkState>,
}
impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            pins: HashMap::new(),
        }
    }
    pub fn seed(&self) -> u64 {
        self.seed
    }
    fn state(&mut self, pin: PinId) -> &mut WalkState {
        let seed = self.seed;
        self.pins.entry(pin).or_insert_with(|| {
            let mut rng = StdRng::seed_from_u64(mix(seed, pin));
            WalkState {
                frequency_hz: 0.1 + 0.05 * f64::from(pin % 8),
                phase: rng.gen_range(0.0..TAU),
                walk: 0.0,
                rng,
            }
        })
    }
}
impl SampleSource for SyntheticSource {
    fn next(&mut self, pin: PinId, elapsed_seconds: f64) -> Result<f64, DaqError> {
        let state = self.state(pin);
        let step: f64 = state.rng.gen_range(-WALK_STEP_VOLTS..=WALK_STEP_VOLTS);
        state.walk = (state.walk + step).clamp(-WALK_LIMIT_VOLTS, WALK_LIMIT_VOLTS);
        let base = SYNTH_AMPLITUDE_VOLTS * (TAU * state.frequency_hz * elapsed_seconds + state.phase).sin();
        Ok((SYNTH_CENTER_VOLTS + base + state.walk).clamp(SYNTH_MIN_VOLTS, SYNTH_MAX_VOLTS))
    }
    fn open(&mut self) -> Result<(), DaqError> {
        self.pins.clear();
        Ok(())
    }
    fn describe(&self) -> String {
        format!("Simulation (seed {:#x})", self.seed)
    }
}
// splitmix64 finaliser
fn mix(seed: u64, pin: PinId) -> u64 {
    let mut z = seed ^ (u64::from(pin).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
/// Pre-scripted readings per pin; `None` entries raise a fault. Useful for
/// tests and for replaying captured values.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<PinId, VecDeque<Option<f64>>>,
    fallback: HashMap<PinId, f64>,
}
impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }
    /// Reading returned once the pin's script is used up.
    pub fn constant(mut self, pin: PinId, voltage: f64) -> Self {
        self.fallback.insert(pin, voltage);
        self
    }
    pub fn script(mut self, pin: PinId, readings: impl IntoIterator<Item = Option<f64>>) -> Self {
        self.scripts.entry(pin).or_default().extend(readings);
        self
    }
}
impl SampleSource for ScriptedSource {
    fn next(&mut self, pin: PinId, _elapsed_seconds: f64) -> Result<f64, DaqError> {
        match self.scripts.get_mut(&pin).and_then(|q| q.pop_front()) {
            Some(Some(v)) => Ok(v),
            Some(None) => Err(DaqError::fault(pin, "scripted fault")),
            None => self
                .fallback
                .get(&pin)
                .copied()
                .ok_or_else(|| DaqError::fault(pin, "no reading scripted")),
        }
    }
    fn describe(&self) -> String {
        "Scripted".into()
    }
}
/// Which source to use, decided once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Synthetic,
    Device,
    #[default]
    Auto,
}
/// The two interchangeable source variants.
pub enum AnySource {
    Synthetic(SyntheticSource),
    Device(UldaqSource),
}
impl AnySource {
    pub fn select(kind: SourceKind, seed: u64) -> Result<Self, DaqError> {
        match kind {
            SourceKind::Synthetic => Ok(AnySource::Synthetic(SyntheticSource::new(seed))),
            SourceKind::Device => UldaqSource::connect_first().map(AnySource::Device),
            SourceKind::Auto if !UldaqSource::probe() => {
                log::info!("no DAQ hardware detected, using simulated source");
                Ok(AnySource::Synthetic(SyntheticSource::new(seed)))
            }
            SourceKind::Auto => match UldaqSource::connect_first() {
                Ok(device) => Ok(AnySource::Device(device)),
                Err(err) => {
                    log::warn!("DAQ detected but not usable ({err}), using simulated source");
                    Ok(AnySource::Synthetic(SyntheticSource::new(seed)))
                }
            },
        }
    }
    pub fn is_simulated(&self) -> bool {
        matches!(self, AnySource::Synthetic(_))
    }
}
impl SampleSource for AnySource {
    fn next(&mut self, pin: PinId, elapsed_seconds: f64) -> Result<f64, DaqError> {
        match self {
            AnySource::Synthetic(s) => s.next(pin, elapsed_seconds),
            AnySource::Device(d) => d.next(pin, elapsed_seconds),
        }
    }
    fn is_available(&self) -> bool {
        match self {
            AnySource::Synthetic(s) => s.is_available(),
            AnySource::Device(d) => d.is_available(),
        }
    }
    fn open(&mut self) -> Result<(), DaqError> {
        match self {
            AnySource::Synthetic(s) => s.open(),
            AnySource::Device(d) => d.open(),
        }
    }
    fn close(&mut self) {
        match self {
            AnySource::Synthetic(s) => s.close(),
            AnySource::Device(d) => d.close(),
        }
    }
    fn describe(&self) -> String {
        match self {
            AnySource::Synthetic(s) => s.describe(),
            AnySource::Device(d) => d.describe(),
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn run(source: &mut SyntheticSource, pin: PinId, ticks: usize) -> Vec<f64> {
        (0..ticks)
            .map(|i| source.next(pin, i as f64 * 0.01).unwrap())
            .collect()
    }
    #[test]
    fn synthetic_is_reproducible_for_same_seed() {
        let mut a = SyntheticSource::new(42);
        let mut b = SyntheticSource::new(42);
        assert_eq!(run(&mut a, 1, 200), run(&mut b, 1, 200));
        let mut c = SyntheticSource::new(43);
        assert_ne!(run(&mut a, 1, 50), run(&mut c, 1, 50));
    }
    #[test]
    fn synthetic_open_restarts_sequence() {
        let mut source = SyntheticSource::new(7);
        let first = run(&mut source, 2, 20);
        source.open().unwrap();
        assert_eq!(run(&mut source, 2, 20), first);
    }
    #[test]
    fn synthetic_stays_in_range() {
        let mut source = SyntheticSource::new(0xDEAD_BEEF);
        for pin in [1, 2, 4, 5, 7, 8, 10, 11] {
            for v in run(&mut source, pin, 2000) {
                assert!((SYNTH_MIN_VOLTS..=SYNTH_MAX_VOLTS).contains(&v), "{v}");
            }
        }
    }
    #[test]
    fn synthetic_pins_are_independent() {
        let mut interleaved = SyntheticSource::new(9);
        let mut solo = SyntheticSource::new(9);
        let mut pin1 = Vec::new();
        for i in 0..50 {
            let t = i as f64 * 0.01;
            pin1.push(interleaved.next(1, t).unwrap());
            interleaved.next(2, t).unwrap();
        }
        assert_eq!(pin1, run(&mut solo, 1, 50));
    }
    #[test]
    fn scripted_faults_then_falls_back() {
        let mut source = ScriptedSource::new()
            .script(3, [Some(1.0), None])
            .constant(3, 2.0);
        assert_eq!(source.next(3, 0.0), Ok(1.0));
        assert!(matches!(
            source.next(3, 0.0),
            Err(DaqError::AcquisitionFault { pin: 3, .. })
        ));
        assert_eq!(source.next(3, 0.0), Ok(2.0));
        assert!(source.next(4, 0.0).is_err());
    }
    #[test]
    fn synthetic_selection_never_touches_hardware() {
        let source = AnySource::select(SourceKind::Synthetic, 1).unwrap();
        assert!(source.is_simulated());
        assert!(source.describe().starts_with("Simulation"));
    }
}
