use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Local, SecondsFormat};
use crate::drivers::calibration::VOLTS;
use crate::drivers::pipeline::SampleSink;
use crate::drivers::{Channel, ChannelRegistry, DaqError};
use crate::types::{PinId, Sample};
const COLUMNS: &str = "Timestamp (Unix),Relative Time (s),Pin Number,Sensor Name,Voltage (V)";
/// Returned by `begin_session`.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionHandle {
    pub id: u64,
    pub started_at: SystemTime,
    pub path: Option<PathBuf>,
    pub pins: Vec<PinId>,
}
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub id: u64,
    pub rows_written: u64,
    pub duration: Duration,
    pub path: Option<PathBuf>,
    /// Set when the session was closed by a write or flush failure.
    pub failure: Option<String>,
}
struct Session {
    id: u64,
    started_at: SystemTime,
    started: Instant,
    writer: LineWriter<Box<dyn Write + Send>>,
    file: Option<File>,
    channels: BTreeMap<PinId, Arc<Channel>>,
    rows: u64,
    path: Option<PathBuf>,
}
impl Session {
    fn summary(&self, failure: Option<String>) -> SessionSummary {
        SessionSummary {
            id: self.id,
            rows_written: self.rows,
            duration: self.started.elapsed(),
            path: self.path.clone(),
            failure,
        }
    }
    fn write_row(&mut self, sample: &Sample, fallback_name: impl FnOnce() -> String) -> io::Result<()> {
        let name = match self.channels.get(&sample.pin) {
            Some(channel) => channel.name.clone(),
            None => fallback_name(),
        };
        let relative = sample.unix_seconds() - unix_seconds(self.started_at);
        writeln!(
            self.writer,
            "{:.6},{:.3},{},{},{:.6},{:.6}",
            sample.unix_seconds(),
            relative,
            sample.pin,
            csv_field(&name),
            sample.raw_voltage,
            sample.calibrated
        )?;
        self.rows += 1;
        Ok(())
    }
    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        if let Some(file) = &self.file {
            file.sync_all()?;
        }
        Ok(())
    }
}
#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Open(Session),
    Closed(SessionSummary),
}
#[derive(Default)]
struct RecorderState {
    slot: Slot,
    next_id: u64,
}
/// CSV recorder fed synchronously from the acquisition thread.
///
/// Each row goes straight to the sink (line buffered), so everything
/// published while a session is open is either written or reported as a
/// `RecordingIOFailure`. A failed write closes the session at once.
#[derive(Clone)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
    registry: ChannelRegistry,
    application_name: String,
}
impl Recorder {
    pub fn new(registry: ChannelRegistry, application_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::default())),
            registry,
            application_name: application_name.into(),
        }
    }
    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn is_recording(&self) -> bool {
        matches!(self.lock().slot, Slot::Open(_))
    }
    pub fn rows_written(&self) -> Option<u64> {
        match &self.lock().slot {
            Slot::Open(session) => Some(session.rows),
            _ => None,
        }
    }
    /// Snapshots the channels being sampled and writes the header block.
    pub fn begin_session(&self, sink: Box<dyn Write + Send>) -> Result<SessionHandle, DaqError> {
        self.open(sink, None, None)
    }
    /// Opens `daq_recording_YYYYMMDD_HHMMSS.csv` in `dir` and starts a session on it.
    pub fn begin_file_session(&self, dir: &Path) -> Result<SessionHandle, DaqError> {
        if self.is_recording() {
            return Err(DaqError::AlreadyRecording);
        }
        let path = recording_path(dir, Local::now());
        let file = File::create(&path)?;
        let sync_handle = file.try_clone()?;
        let opened = self.open(Box::new(file), Some(sync_handle), Some(path.clone()));
        if opened.is_err() {
            let _ = std::fs::remove_file(&path);
        }
        opened
    }
    fn open(
        &self,
        sink: Box<dyn Write + Send>,
        file: Option<File>,
        path: Option<PathBuf>,
    ) -> Result<SessionHandle, DaqError> {
        let mut state = self.lock();
        if matches!(state.slot, Slot::Open(_)) {
            return Err(DaqError::AlreadyRecording);
        }
        let channels: BTreeMap<PinId, Arc<Channel>> = self
            .registry
            .channels()
            .into_iter()
            .filter(|c| c.is_sampled())
            .map(|c| (c.pin(), c))
            .collect();
        let started_at = SystemTime::now();
        let mut writer = LineWriter::new(sink);
        write_header(&mut writer, &self.application_name, started_at, &channels)?;
        let id = state.next_id;
        state.next_id += 1;
        let handle = SessionHandle {
            id,
            started_at,
            path: path.clone(),
            pins: channels.keys().copied().collect(),
        };
        match &path {
            Some(p) => log::info!("recording session {id} started: {}", p.display()),
            None => log::info!("recording session {id} started"),
        }
        state.slot = Slot::Open(Session {
            id,
            started_at,
            started: Instant::now(),
            writer,
            file,
            channels,
            rows: 0,
            path,
        });
        Ok(handle)
    }
    /// Appends one row when a session is open; a no-op otherwise.
    pub fn on_sample(&self, sample: &Sample) -> Result<(), DaqError> {
        let mut state = self.lock();
        let Slot::Open(session) = &mut state.slot else {
            return Ok(());
        };
        let registry = &self.registry;
        let result = session.write_row(sample, || {
            registry
                .get(sample.pin)
                .map(|c| c.name)
                .unwrap_or_else(|_| format!("Pin {}", sample.pin))
        });
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                let summary = session.summary(Some(err.to_string()));
                log::error!(
                    "recording session {} aborted after {} rows: {err}",
                    summary.id,
                    summary.rows_written
                );
                state.slot = Slot::Closed(summary);
                Err(DaqError::RecordingIOFailure(err.to_string()))
            }
        }
    }
    /// Flushes and closes the session. Calling it again after a close returns
    /// the same summary.
    pub fn end_session(&self) -> Result<SessionSummary, DaqError> {
        let mut state = self.lock();
        match std::mem::take(&mut state.slot) {
            Slot::Empty => Err(DaqError::NoActiveSession),
            Slot::Closed(summary) => {
                state.slot = Slot::Closed(summary.clone());
                Ok(summary)
            }
            Slot::Open(mut session) => match session.finish() {
                Ok(()) => {
                    let summary = session.summary(None);
                    log::info!(
                        "recording session {} closed: {} rows in {:.1} s",
                        summary.id,
                        summary.rows_written,
                        summary.duration.as_secs_f64()
                    );
                    state.slot = Slot::Closed(summary.clone());
                    Ok(summary)
                }
                Err(err) => {
                    log::error!("recording session {} failed to flush: {err}", session.id);
                    state.slot = Slot::Closed(session.summary(Some(err.to_string())));
                    Err(DaqError::RecordingIOFailure(err.to_string()))
                }
            },
        }
    }
}
impl SampleSink for Recorder {
    fn on_sample(&self, sample: &Sample) -> Result<(), DaqError> {
        Recorder::on_sample(self, sample)
    }
}
fn unix_seconds(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
/// First free `daq_recording_<stamp>[_n].csv` in `dir`.
fn recording_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("daq_recording_{stamp}.csv"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("daq_recording_{stamp}_{n}.csv"));
        n += 1;
    }
    path
}
fn write_header<W: Write>(
    w: &mut W,
    application_name: &str,
    started_at: SystemTime,
    channels: &BTreeMap<PinId, Arc<Channel>>,
) -> io::Result<()> {
    let generated: DateTime<Local> = started_at.into();
    writeln!(w, "# {application_name} Sensor Recording")?;
    writeln!(
        w,
        "# Generated: {}",
        generated.to_rfc3339_opts(SecondsFormat::Secs, false)
    )?;
    for (pin, channel) in channels {
        match channel.calibration.as_ref().filter(|c| c.is_enabled()) {
            Some(cal) => {
                let unit = cal.unit();
                let (a, b) = (cal.point_a(), cal.point_b());
                writeln!(w, "# Pin {pin} ({}): Calibrated to {unit}", channel.name)?;
                writeln!(
                    w,
                    "#   Calibration: {} {unit} @ {} V, {} {unit} @ {} V",
                    a.value, a.voltage, b.value, b.voltage
                )?;
            }
            None => writeln!(w, "# Pin {pin} ({}): Raw voltage (not calibrated)", channel.name)?,
        }
    }
    writeln!(w, "{COLUMNS},Calibrated Value ({})", column_unit(channels))
}
fn column_unit(channels: &BTreeMap<PinId, Arc<Channel>>) -> String {
    let units: BTreeSet<&str> = channels.values().map(|c| c.unit()).collect();
    if units.is_empty() {
        VOLTS.to_string()
    } else {
        units.into_iter().collect::<Vec<_>>().join("/")
    }
}
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
