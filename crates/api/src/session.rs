//! Processing session
//!
//! One dedicated thread owns the frame source and the DMS module. Frames are
//! read and analyzed strictly in order; events fan out to the event sinks and
//! the alert worker, neither of which blocks the loop. Live tuning arrives as
//! [`SessionCommand`]s drained between frames.

use alerting::{AlertKind, AlertSink};
use camera_capture::{CameraConfig, FrameSource};
use dms::{DmsModule, EventSink, FrameInstant, GestureEvent};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use head_gesture::PointTracker;
use metrics::counter;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::{StatusSnapshot, SystemStatus};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::settings::SessionConfig;
use crate::ApiError;

/// Live control of a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetNodSensitivity(u32),
    SetCooldown(Duration),
    SetHandHoldTime(Duration),
    SetFaceBoxFrames(u32),
    SetFrameDivisor(u32),
    Stop,
}

/// Where the session delivers its results
pub struct SessionOutputs {
    /// Receive every event (repository, detection log)
    pub sinks: Vec<Arc<dyn EventSink>>,
    pub alerts: Option<Arc<dyn AlertSink>>,
    /// Shared with the HTTP handlers
    pub status: Arc<RwLock<StatusSnapshot>>,
    /// Snapshot file for the dashboard; `None` keeps it in memory only
    pub status_file: Option<PathBuf>,
    /// Processed frames between periodic snapshot writes
    pub snapshot_every_frames: u64,
}

/// Counters returned when the processing thread exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub events: u64,
    pub read_errors: u64,
}

/// Handle to the processing thread
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    thread: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// A sender for the HTTP layer
    pub fn commands(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.commands.clone()
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), ApiError> {
        self.commands
            .send(command)
            .map_err(|_| ApiError::SessionUnavailable("processing thread has exited".into()))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the thread to stop and wait for it. Blocks the caller.
    pub fn stop(self) -> Result<SessionReport, ApiError> {
        // Already gone when the stream ended on its own
        let _ = self.commands.send(SessionCommand::Stop);
        self.join()
    }

    /// Wait for the thread to finish on its own. Blocks the caller.
    pub fn join(self) -> Result<SessionReport, ApiError> {
        self.thread
            .join()
            .map_err(|_| ApiError::Internal("processing thread panicked".into()))
    }
}

/// Open `source` and start the processing thread.
///
/// A source that cannot be opened is returned as an error and no thread is
/// left running.
pub fn start<S, T>(
    mut source: S,
    dms: DmsModule<T>,
    outputs: SessionOutputs,
    config: SessionConfig,
    camera: &CameraConfig,
) -> Result<SessionHandle, ApiError>
where
    S: FrameSource + 'static,
    T: PointTracker + Send + 'static,
{
    if config.frame_divisor == 0 {
        return Err(ApiError::BadRequest("frame divisor must be at least 1".into()));
    }
    source.open()?;

    let (commands, rx) = mpsc::unbounded_channel();
    let runner = Runner::new(dms, outputs, config, camera);
    let thread = std::thread::Builder::new()
        .name("cockpit-session".into())
        .spawn(move || {
            let mut runner = runner;
            runner.run(source, rx)
        });

    match thread {
        Ok(thread) => Ok(SessionHandle { commands, thread }),
        Err(e) => Err(ApiError::Io(e)),
    }
}

struct Runner<T: PointTracker> {
    dms: DmsModule<T>,
    outputs: SessionOutputs,
    divisor: u32,
    width: u32,
    frame_interval: Option<Duration>,
    error_backoff: Duration,
    error_log: DefaultDirectRateLimiter,
    report: SessionReport,
}

impl<T: PointTracker> Runner<T> {
    fn new(dms: DmsModule<T>, outputs: SessionOutputs, config: SessionConfig, camera: &CameraConfig) -> Self {
        let quota = Quota::with_period(config.error_log_interval())
            .unwrap_or_else(|| Quota::per_minute(NonZeroU32::MIN));
        let frame_interval = (config.realtime && camera.fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / camera.fps as f64));

        Self {
            dms,
            outputs,
            divisor: config.frame_divisor.max(1),
            width: camera.width,
            frame_interval,
            error_backoff: config.error_backoff(),
            error_log: RateLimiter::direct(quota),
            report: SessionReport::default(),
        }
    }

    fn run<S: FrameSource>(&mut self, mut source: S, mut commands: mpsc::UnboundedReceiver<SessionCommand>) -> SessionReport {
        info!("Processing session started (every {} frame(s), width {})", self.divisor, self.width);
        self.set_status(SystemStatus::Running);
        let mut final_status = SystemStatus::Stopped;

        'frames: loop {
            while let Ok(command) = commands.try_recv() {
                if command == SessionCommand::Stop {
                    info!("Stop requested");
                    break 'frames;
                }
                self.apply(command);
            }

            let started = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source exhausted");
                    break;
                }
                Err(e) if e.is_transient() => {
                    self.report.read_errors += 1;
                    if self.error_log.check().is_ok() {
                        warn!("Frame read failed ({} so far): {}", self.report.read_errors, e);
                    }
                    std::thread::sleep(self.error_backoff);
                    continue;
                }
                Err(e) => {
                    error!("Frame source failed: {}", e);
                    final_status = SystemStatus::Error;
                    break;
                }
            };

            self.report.frames_read += 1;
            if self.report.frames_read % self.divisor as u64 != 0 {
                continue;
            }

            let frame = frame.resize_to_width(self.width);
            match self.dms.analyze(&frame, FrameInstant::now()) {
                Ok(analysis) => {
                    self.report.frames_processed += 1;
                    counter!("cockpit_frames_processed_total").increment(1);

                    if let Ok(mut status) = self.outputs.status.write() {
                        status.apply_analysis(&analysis);
                    }
                    for event in &analysis.events {
                        self.dispatch(event);
                    }

                    let periodic = self.outputs.snapshot_every_frames > 0
                        && self.report.frames_processed % self.outputs.snapshot_every_frames == 0;
                    if periodic || analysis.has_events() {
                        self.save_snapshot();
                    }
                }
                Err(e) => {
                    if self.error_log.check().is_ok() {
                        warn!("Frame {} analysis failed: {}", frame.sequence, e);
                    }
                }
            }

            if let Some(interval) = self.frame_interval {
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }

        // Release the source only after the loop has stopped using it
        source.close();
        self.set_status(final_status);
        self.save_snapshot();
        info!(
            "Processing session ended: {} frames read, {} processed, {} events",
            self.report.frames_read, self.report.frames_processed, self.report.events
        );
        self.report
    }

    fn apply(&mut self, command: SessionCommand) {
        debug!("Session command {:?}", command);
        match command {
            SessionCommand::SetNodSensitivity(value) => {
                if let Err(e) = self.dms.set_nod_sensitivity(value) {
                    warn!("Nod sensitivity {} rejected: {}", value, e);
                }
            }
            SessionCommand::SetCooldown(cooldown) => self.dms.set_cooldown(cooldown),
            SessionCommand::SetHandHoldTime(hold) => self.dms.set_hand_hold_time(hold),
            SessionCommand::SetFaceBoxFrames(frames) => self.dms.set_face_box_frames(frames),
            SessionCommand::SetFrameDivisor(divisor) => {
                self.divisor = divisor.max(1);
                info!("Processing every {} frame(s)", self.divisor);
            }
            SessionCommand::Stop => {}
        }
    }

    fn dispatch(&mut self, event: &GestureEvent) {
        self.report.events += 1;
        counter!("cockpit_events_total", "kind" => event.kind.as_str()).increment(1);

        if let Ok(mut status) = self.outputs.status.write() {
            status.apply_event(event);
        }
        for sink in &self.outputs.sinks {
            sink.record(event);
        }
        if let (Some(alerts), Some(kind)) = (&self.outputs.alerts, AlertKind::from_event(event)) {
            alerts.alert(kind);
        }
    }

    fn set_status(&self, system_status: SystemStatus) {
        if let Ok(mut status) = self.outputs.status.write() {
            status.set_status(system_status);
        }
    }

    fn save_snapshot(&self) {
        let Some(path) = &self.outputs.status_file else {
            return;
        };
        let result = match self.outputs.status.read() {
            Ok(status) => status.save(path),
            Err(_) => return,
        };
        if let Err(e) = result {
            warn!("Status snapshot not written to {}: {}", path.display(), e);
        }
    }
}
