use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use crate::drivers::source::SampleSource;
use crate::drivers::{ChannelRegistry, DaqError, PlotBuffer};
use crate::recorder::{Recorder, SessionHandle, SessionSummary};
use crate::types::{DaqEvent, Notifier, PinId, Sample};
/// Consecutive source faults after which a channel is switched off.
pub const MAX_CONSECUTIVE_FAULTS: u32 = 3;
const OVERRUN_LOG_EVERY: u64 = 100;
/// Synchronous subscriber invoked from the acquisition thread for every sample.
pub trait SampleSink: Send + Sync {
    fn on_sample(&self, sample: &Sample) -> Result<(), DaqError>;
}
/// Outcome of a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub published: usize,
    pub faults: usize,
    pub disabled: usize,
}
/// Everything one tick needs: the source, the channel table, the subscribers
/// and the per-run counters. Owned by exactly one thread at a time.
pub struct AcquisitionCore<S: SampleSource> {
    source: S,
    registry: ChannelRegistry,
    sinks: Vec<Arc<dyn SampleSink>>,
    notifier: Notifier,
    next_index: HashMap<PinId, u64>,
    faults: HashMap<PinId, u32>,
    ticks: u64,
}
impl<S: SampleSource> AcquisitionCore<S> {
    pub fn new(source: S, registry: ChannelRegistry) -> Self {
        Self {
            source,
            registry,
            sinks: Vec::new(),
            notifier: Notifier::disconnected(),
            next_index: HashMap::new(),
            faults: HashMap::new(),
            ticks: 0,
        }
    }
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }
    pub fn subscribe(&mut self, sink: Arc<dyn SampleSink>) {
        self.sinks.push(sink);
    }
    pub fn source(&self) -> &S {
        &self.source
    }
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
    /// Clears per-run state; sample indices start again at zero.
    pub fn reset(&mut self) {
        self.next_index.clear();
        self.faults.clear();
        self.ticks = 0;
    }
    pub fn into_source(self) -> S {
        self.source
    }
    /// Samples every active channel once and publishes the results.
    ///
    /// The channel set and calibrations are snapshotted up front, so edits
    /// made while the tick runs apply from the next tick on.
    pub fn tick(&mut self, elapsed_seconds: f64) -> TickReport {
        let mut report = TickReport::default();
        for channel in self.registry.sampled_snapshot() {
            let pin = channel.pin();
            let raw = self.source.next(pin, elapsed_seconds).and_then(|v| {
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(DaqError::fault(pin, format!("non-finite reading {v}")))
                }
            });
            match raw {
                Ok(raw_voltage) => {
                    self.faults.remove(&pin);
                    let index = self.next_index.entry(pin).or_insert(0);
                    let sample = Sample {
                        pin,
                        timestamp: SystemTime::now(),
                        raw_voltage,
                        calibrated: channel.apply(raw_voltage),
                        index: *index,
                    };
                    *index += 1;
                    self.publish(&sample);
                    report.published += 1;
                }
                Err(err) => {
                    report.faults += 1;
                    if self.record_fault(pin, &err) {
                        report.disabled += 1;
                    }
                }
            }
        }
        self.ticks += 1;
        report
    }
    fn publish(&self, sample: &Sample) {
        for sink in &self.sinks {
            match sink.on_sample(sample) {
                Ok(()) => {}
                Err(DaqError::RecordingIOFailure(msg)) => {
                    log::error!("recording closed after write failure: {msg}");
                    self.notifier.notify(DaqEvent::RecordingFailed(msg));
                }
                Err(err) => log::error!("sample subscriber failed on pin {}: {err}", sample.pin),
            }
        }
    }
    /// Returns true when this fault switched the channel off.
    fn record_fault(&mut self, pin: PinId, err: &DaqError) -> bool {
        let count = self.faults.entry(pin).or_insert(0);
        *count += 1;
        let count = *count;
        log::warn!("pin {pin}: {err} ({count}/{MAX_CONSECUTIVE_FAULTS})");
        if count < MAX_CONSECUTIVE_FAULTS {
            return false;
        }
        self.faults.remove(&pin);
        match self.registry.toggle_active(pin, false) {
            Ok(()) => {
                log::warn!("pin {pin} disabled after {count} consecutive faults");
                self.notifier.notify(DaqEvent::ChannelAutoDisabled { pin, faults: count });
                true
            }
            // Removed while we were sampling it.
            Err(_) => false,
        }
    }
}
struct Worker<S: SampleSource> {
    stop_tx: Sender<()>,
    handle: JoinHandle<AcquisitionCore<S>>,
    sample_rate_hz: f64,
}
enum LoopState<S: SampleSource> {
    Idle(AcquisitionCore<S>),
    Running(Worker<S>),
    Lost,
}
/// `Idle -> Running -> Idle` state machine around a dedicated sampling thread.
///
/// All control calls take the same lock, so commands never interleave.
/// `stop` joins the worker before returning: once it returns no further
/// sample is published.
pub struct AcquisitionLoop<S: SampleSource + 'static> {
    state: Mutex<LoopState<S>>,
    /// Held by the worker for the duration of each tick.
    tick_gate: Arc<Mutex<()>>,
    registry: ChannelRegistry,
    recorder: Recorder,
    notifier: Notifier,
}
impl<S: SampleSource + 'static> AcquisitionLoop<S> {
    /// Wires `source` to the plot buffer and the recorder.
    pub fn new(
        source: S,
        registry: ChannelRegistry,
        plot: PlotBuffer,
        recorder: Recorder,
        notifier: Notifier,
    ) -> Self {
        let mut core = AcquisitionCore::new(source, registry.clone()).with_notifier(notifier.clone());
        core.subscribe(Arc::new(plot));
        core.subscribe(Arc::new(recorder.clone()));
        Self {
            state: Mutex::new(LoopState::Idle(core)),
            tick_gate: Arc::new(Mutex::new(())),
            registry,
            recorder,
            notifier,
        }
    }
    fn lock(&self) -> MutexGuard<'_, LoopState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), LoopState::Running(_))
    }
    pub fn sample_rate_hz(&self) -> Option<f64> {
        match &*self.lock() {
            LoopState::Running(worker) => Some(worker.sample_rate_hz),
            _ => None,
        }
    }
    /// Extra subscriber; only accepted while idle.
    pub fn subscribe(&self, sink: Arc<dyn SampleSink>) -> Result<(), DaqError> {
        match &mut *self.lock() {
            LoopState::Idle(core) => {
                core.subscribe(sink);
                Ok(())
            }
            LoopState::Running(_) => Err(DaqError::AlreadyRunning),
            LoopState::Lost => Err(DaqError::Worker("acquisition worker was lost".into())),
        }
    }
    /// Ticks completed by the last finished run.
    pub fn last_run_ticks(&self) -> Option<u64> {
        match &*self.lock() {
            LoopState::Idle(core) => Some(core.ticks()),
            _ => None,
        }
    }
    pub fn describe_source(&self) -> Option<String> {
        match &*self.lock() {
            LoopState::Idle(core) => Some(core.source().describe()),
            _ => None,
        }
    }
    pub fn start(&self, sample_rate_hz: f64) -> Result<(), DaqError> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(DaqError::InvalidSampleRate(sample_rate_hz));
        }
        let mut state = self.lock();
        let mut core = match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Idle(core) => core,
            running @ LoopState::Running(_) => {
                *state = running;
                return Err(DaqError::AlreadyRunning);
            }
            LoopState::Lost => return Err(DaqError::Worker("acquisition worker was lost".into())),
        };
        core.reset();
        if let Err(err) = core.source.open() {
            *state = LoopState::Idle(core);
            return Err(err);
        }
        let (stop_tx, stop_rx) = mpsc::channel();
        let gate = self.tick_gate.clone();
        let handle = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || run_worker(core, sample_rate_hz, stop_rx, gate))
            .map_err(|e| DaqError::Worker(e.to_string()))?;
        *state = LoopState::Running(Worker {
            stop_tx,
            handle,
            sample_rate_hz,
        });
        drop(state);
        log::info!("acquisition started at {sample_rate_hz} Hz");
        self.notifier.notify(DaqEvent::AcquisitionStarted { sample_rate_hz });
        Ok(())
    }
    /// Stops sampling and closes any open recording session. A no-op when idle.
    ///
    /// The control lock is held until the session is closed, so a `start`
    /// issued meanwhile waits for the old session to be flushed. The stop is
    /// announced even when that final flush fails.
    pub fn stop(&self) -> Result<Option<SessionSummary>, DaqError> {
        let mut state = self.lock();
        let worker = match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Running(worker) => worker,
            other => {
                *state = other;
                return Ok(None);
            }
        };
        // The worker may already be gone; join reports that.
        let _ = worker.stop_tx.send(());
        let joined = worker.handle.join();
        let ticks = match joined {
            Ok(core) => {
                let ticks = core.ticks();
                *state = LoopState::Idle(core);
                Some(ticks)
            }
            Err(_) => None,
        };
        let closed = if self.recorder.is_recording() {
            Some(self.recorder.end_session())
        } else {
            None
        };
        self.notifier.notify(DaqEvent::AcquisitionStopped);
        match ticks {
            Some(ticks) => log::info!("acquisition stopped after {ticks} ticks"),
            None => return Err(DaqError::Worker("acquisition thread panicked".into())),
        }
        closed.transpose()
    }
    /// Channel selection goes through the control path like start/stop and
    /// lands between two ticks.
    pub fn toggle_active(&self, pin: PinId, active: bool) -> Result<(), DaqError> {
        let _state = self.lock();
        let _gate = self.tick_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.registry.toggle_active(pin, active)
    }
    /// Opens a recording session; only allowed while sampling.
    pub fn begin_recording(
        &self,
        sink: Box<dyn Write + Send>,
    ) -> Result<SessionHandle, DaqError> {
        let state = self.lock();
        if !matches!(*state, LoopState::Running(_)) {
            return Err(DaqError::NotRunning);
        }
        self.recorder.begin_session(sink)
    }
    pub fn begin_file_recording(&self, dir: &Path) -> Result<SessionHandle, DaqError> {
        let state = self.lock();
        if !matches!(*state, LoopState::Running(_)) {
            return Err(DaqError::NotRunning);
        }
        self.recorder.begin_file_session(dir)
    }
    pub fn end_recording(&self) -> Result<SessionSummary, DaqError> {
        let _state = self.lock();
        self.recorder.end_session()
    }
}
impl<S: SampleSource + 'static> Drop for AcquisitionLoop<S> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("acquisition shutdown: {err}");
        }
    }
}
fn run_worker<S: SampleSource>(
    mut core: AcquisitionCore<S>,
    sample_rate_hz: f64,
    stop_rx: mpsc::Receiver<()>,
    gate: Arc<Mutex<()>>,
) -> AcquisitionCore<S> {
    let period = Duration::from_secs_f64(1.0 / sample_rate_hz);
    let started = Instant::now();
    let mut tick: u64 = 0;
    let mut overruns: u64 = 0;
    loop {
        // Absolute deadlines: a late tick does not push later ones back.
        let deadline = started + Duration::from_secs_f64(tick as f64 / sample_rate_hz);
        let now = Instant::now();
        if deadline > now {
            match stop_rx.recv_timeout(deadline - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match stop_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break,
            }
        }
        let tick_started = Instant::now();
        let report = {
            let _gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
            core.tick((tick_started - started).as_secs_f64())
        };
        let took = tick_started.elapsed();
        if took > period {
            overruns += 1;
            if overruns % OVERRUN_LOG_EVERY == 1 {
                log::warn!(
                    "tick {tick} took {:.1} ms (period {:.1} ms, {} samples, {overruns} overruns so far)",
                    took.as_secs_f64() * 1e3,
                    period.as_secs_f64() * 1e3,
                    report.published
                );
            }
        }
        tick += 1;
    }
    core.source.close();
    core
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::calibration::CalibrationPoint;
    use crate::drivers::source::{ScriptedSource, SyntheticSource};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    #[derive(Default)]
    struct Counter {
        seen: Mutex<Vec<Sample>>,
    }
    impl SampleSink for Counter {
        fn on_sample(&self, sample: &Sample) -> Result<(), DaqError> {
            self.seen.lock().unwrap().push(*sample);
            Ok(())
        }
    }
    fn registry_with(active: &[PinId]) -> ChannelRegistry {
        let registry = ChannelRegistry::with_default_pins();
        for pin in active {
            registry.toggle_active(*pin, true).unwrap();
        }
        registry
    }
    #[test]
    fn tick_publishes_calibrated_samples() {
        let registry = registry_with(&[1]);
        registry
            .set_calibration(
                1,
                CalibrationPoint::new(0.0, 1.0),
                CalibrationPoint::new(100.0, 5.0),
                "psi",
            )
            .unwrap();
        let counter = Arc::new(Counter::default());
        let mut core = AcquisitionCore::new(ScriptedSource::new().constant(1, 2.5), registry);
        core.subscribe(counter.clone());
        core.tick(0.0);
        core.tick(0.01);
        let seen = counter.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].raw_voltage, 2.5);
        assert!((seen[0].calibrated - 37.5).abs() < 1e-9);
        assert_eq!(seen.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
    }
    #[test]
    fn only_enabled_and_active_channels_are_sampled() {
        let registry = registry_with(&[1, 2, 4]);
        registry.set_enabled(4, false).unwrap();
        let counter = Arc::new(Counter::default());
        let mut core = AcquisitionCore::new(SyntheticSource::new(1), registry);
        core.subscribe(counter.clone());
        let report = core.tick(0.0);
        assert_eq!(report.published, 2);
        let pins: Vec<PinId> = counter.seen.lock().unwrap().iter().map(|s| s.pin).collect();
        assert_eq!(pins, vec![1, 2]);
    }
    #[test]
    fn three_consecutive_faults_disable_only_that_channel() {
        let (notifier, events) = Notifier::channel(16);
        let registry = registry_with(&[1, 2]);
        let source = ScriptedSource::new()
            .constant(1, 1.0)
            .script(2, [None, None, None])
            .constant(2, 3.0);
        let counter = Arc::new(Counter::default());
        let mut core = AcquisitionCore::new(source, registry.clone()).with_notifier(notifier);
        core.subscribe(counter.clone());
        for t in 0..3 {
            core.tick(t as f64);
        }
        assert!(!registry.get(2).unwrap().active);
        assert!(registry.get(1).unwrap().active);
        core.tick(3.0);
        let seen = counter.seen.lock().unwrap();
        assert_eq!(seen.iter().filter(|s| s.pin == 1).count(), 4);
        assert_eq!(seen.iter().filter(|s| s.pin == 2).count(), 0);
        let events: Vec<DaqEvent> = events.try_iter().collect();
        assert!(events.contains(&DaqEvent::ChannelAutoDisabled { pin: 2, faults: 3 }));
    }
    #[test]
    fn interrupted_fault_streak_keeps_channel() {
        let registry = registry_with(&[2]);
        let source = ScriptedSource::new().script(2, [None, None, Some(1.0), None, None, Some(1.0)]);
        let mut core = AcquisitionCore::new(source, registry.clone());
        for t in 0..6 {
            core.tick(t as f64);
        }
        assert!(registry.get(2).unwrap().active);
    }
    #[test]
    fn indices_restart_after_reset() {
        let registry = registry_with(&[5]);
        let counter = Arc::new(Counter::default());
        let mut core = AcquisitionCore::new(ScriptedSource::new().constant(5, 0.5), registry);
        core.subscribe(counter.clone());
        core.tick(0.0);
        core.tick(0.1);
        core.reset();
        core.tick(0.0);
        let indices: Vec<u64> = counter.seen.lock().unwrap().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 0]);
        assert_eq!(core.ticks(), 1);
    }
    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }
    impl SampleSource for CountingSource {
        fn next(&mut self, _pin: PinId, _elapsed: f64) -> Result<f64, DaqError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1.0)
        }
        fn describe(&self) -> String {
            "counting".into()
        }
    }
    fn idle_loop<S: SampleSource + 'static>(source: S, registry: ChannelRegistry) -> (AcquisitionLoop<S>, PlotBuffer) {
        notifying_loop(source, registry, Notifier::disconnected())
    }
    fn notifying_loop<S: SampleSource + 'static>(
        source: S,
        registry: ChannelRegistry,
        notifier: Notifier,
    ) -> (AcquisitionLoop<S>, PlotBuffer) {
        let plot = PlotBuffer::with_capacity(100_000).unwrap();
        let recorder = Recorder::new(registry.clone(), "Test");
        let acq = AcquisitionLoop::new(source, registry, plot.clone(), recorder, notifier);
        (acq, plot)
    }
    /// Sink whose `flush` blocks for `delay` once armed.
    struct SlowFlush {
        delay: Duration,
        armed: Arc<AtomicBool>,
        flushed: Arc<AtomicBool>,
    }
    impl Write for SlowFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            if self.armed.load(Ordering::SeqCst) {
                thread::sleep(self.delay);
                self.flushed.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }
    /// Sink whose `flush` fails once armed.
    struct FailingFlush {
        armed: Arc<AtomicBool>,
    }
    impl Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            if self.armed.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "fsync failed"));
            }
            Ok(())
        }
    }
    /// Runs at `rate` for roughly `run`; returns (ticks, seconds between
    /// `start` returning and `stop` being called).
    fn timed_run(rate: f64, run: Duration, pins: &[PinId]) -> (i64, f64, PlotBuffer) {
        let (acq, plot) = idle_loop(SyntheticSource::new(11), registry_with(pins));
        acq.start(rate).unwrap();
        let started = Instant::now();
        thread::sleep(run);
        let elapsed = started.elapsed().as_secs_f64();
        acq.stop().unwrap();
        let ticks = acq.last_run_ticks().unwrap() as i64;
        (ticks, elapsed, plot)
    }
    #[test]
    fn start_twice_is_rejected_and_stop_is_idempotent() {
        let (acq, _plot) = idle_loop(SyntheticSource::new(3), registry_with(&[1]));
        assert_eq!(acq.stop(), Ok(None));
        acq.start(50.0).unwrap();
        assert!(acq.is_running());
        assert_eq!(acq.start(50.0), Err(DaqError::AlreadyRunning));
        acq.stop().unwrap();
        assert!(!acq.is_running());
        assert_eq!(acq.stop(), Ok(None));
        assert!(matches!(acq.start(0.0), Err(DaqError::InvalidSampleRate(_))));
    }
    #[test]
    fn no_samples_after_stop_returns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (acq, plot) = idle_loop(CountingSource { calls: calls.clone() }, registry_with(&[1, 2]));
        acq.start(500.0).unwrap();
        thread::sleep(Duration::from_millis(50));
        acq.stop().unwrap();
        let after_stop = calls.load(Ordering::SeqCst);
        let plotted = plot.len(1) + plot.len(2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        assert_eq!(plot.len(1) + plot.len(2), plotted);
        assert!(after_stop > 0);
    }
    #[test]
    fn cadence_matches_rate() {
        let rate = 50.0;
        let (ticks, elapsed, plot) = timed_run(rate, Duration::from_millis(1000), &[1, 7]);
        let expected = (elapsed * rate).floor() as i64;
        assert!((ticks - expected).abs() <= 1, "{ticks} ticks vs {expected}");
        for pin in [1, 7] {
            assert_eq!(plot.len(pin) as i64, ticks, "pin {pin}");
        }
    }
    #[test]
    fn skew_stays_within_one_period_per_thousand_ticks() {
        let rate = 1000.0;
        let (ticks, elapsed, _plot) = timed_run(rate, Duration::from_secs(2), &[1]);
        let expected = (elapsed * rate).floor() as i64;
        // One tick of rounding plus one period per 1000 ticks.
        let allowed = 1 + expected / 1000;
        assert!(
            (ticks - expected).abs() <= allowed,
            "{ticks} ticks vs {expected} (allowed {allowed})"
        );
    }
    #[test]
    fn start_waits_for_stop_to_close_the_session() {
        let (acq, _plot) = idle_loop(SyntheticSource::new(2), registry_with(&[1]));
        let armed = Arc::new(AtomicBool::new(false));
        let flushed = Arc::new(AtomicBool::new(false));
        acq.start(100.0).unwrap();
        acq.begin_recording(Box::new(SlowFlush {
            delay: Duration::from_millis(300),
            armed: armed.clone(),
            flushed: flushed.clone(),
        }))
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        armed.store(true, Ordering::SeqCst);
        thread::scope(|s| {
            let stopper = s.spawn(|| acq.stop());
            thread::sleep(Duration::from_millis(100));
            acq.start(100.0).unwrap();
            assert!(flushed.load(Ordering::SeqCst), "restarted before the session was closed");
            let summary = stopper.join().unwrap().unwrap().expect("session closed by stop");
            assert!(summary.failure.is_none());
        });
        assert!(acq.is_running());
        assert!(!acq.recorder.is_recording());
        assert_eq!(acq.stop(), Ok(None));
    }
    #[test]
    fn failed_final_flush_still_reports_stop() {
        let (notifier, events) = Notifier::channel(16);
        let (acq, _plot) = notifying_loop(SyntheticSource::new(4), registry_with(&[1]), notifier);
        let armed = Arc::new(AtomicBool::new(false));
        acq.start(100.0).unwrap();
        acq.begin_recording(Box::new(FailingFlush { armed: armed.clone() }))
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        armed.store(true, Ordering::SeqCst);
        assert!(matches!(acq.stop(), Err(DaqError::RecordingIOFailure(_))));
        assert!(!acq.is_running());
        let events: Vec<DaqEvent> = events.try_iter().collect();
        assert_eq!(events.last(), Some(&DaqEvent::AcquisitionStopped));
        // The loop is idle again and can be restarted.
        acq.start(100.0).unwrap();
        assert_eq!(acq.stop(), Ok(None));
    }
    #[test]
    fn three_ticks_record_three_rows() {
        let registry = registry_with(&[1]);
        let recorder = Recorder::new(registry.clone(), "Test");
        let mut core = AcquisitionCore::new(ScriptedSource::new().constant(1, 2.5), registry);
        core.subscribe(Arc::new(recorder.clone()));
        recorder.begin_session(Box::new(std::io::sink())).unwrap();
        for t in 0..3 {
            core.tick(t as f64 * 0.01);
        }
        assert_eq!(recorder.end_session().unwrap().rows_written, 3);
    }
    #[test]
    fn rows_equal_samples_published_while_session_open() {
        let registry = registry_with(&[1, 2]);
        let recorder = Recorder::new(registry.clone(), "Test");
        let source = ScriptedSource::new()
            .constant(1, 1.0)
            .script(2, [Some(2.0), None, Some(2.0), None, None, Some(2.0), None])
            .constant(2, 2.0);
        let mut core = AcquisitionCore::new(source, registry);
        core.subscribe(Arc::new(recorder.clone()));
        let mut t = 0.0;
        for (idle_ticks, session_ticks) in [(2, 0), (1, 3), (0, 4), (3, 1)] {
            for _ in 0..idle_ticks {
                core.tick(t);
                t += 0.01;
            }
            recorder.begin_session(Box::new(std::io::sink())).unwrap();
            let mut published = 0;
            for _ in 0..session_ticks {
                published += core.tick(t).published;
                t += 0.01;
            }
            let summary = recorder.end_session().unwrap();
            assert_eq!(summary.rows_written as usize, published);
        }
    }
    #[test]
    fn recording_requires_running_and_closes_on_stop() {
        let (acq, _plot) = idle_loop(SyntheticSource::new(5), registry_with(&[1]));
        assert!(matches!(
            acq.begin_recording(Box::new(Vec::<u8>::new())),
            Err(DaqError::NotRunning)
        ));
        acq.start(100.0).unwrap();
        acq.begin_recording(Box::new(std::io::sink())).unwrap();
        thread::sleep(Duration::from_millis(100));
        let summary = acq.stop().unwrap().expect("session closed by stop");
        assert!(summary.rows_written > 0);
        assert!(summary.failure.is_none());
    }
}
