//! Recording session management.
//!
//! A [`CaptureSession`] runs one logical recording: a single native start
//! call (screen, audio and camera together) plus the cursor sampler, all
//! anchored to one session timestamp.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use capsync_common::clock::{unix_time_ms, SessionClock};
use capsync_common::config::{CursorConfig, RecordingDefaults};
use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_input_tracker::{CursorSampler, SamplerStats, SamplingContext};
use capsync_platform_core::{NativeBackend, NativeRecordingOptions, Rect};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendPointer;
use crate::geometry::{resolve_target, ResolvedTarget};
use crate::paths::SessionPaths;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
const COMPLETION_DELAY: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Options for one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingOptions {
    pub display_id: Option<u32>,

    /// Record a single window. Implies `display_id` and `capture_area`
    /// unless an explicit area is given.
    pub window_id: Option<u32>,

    /// Display-relative capture rectangle.
    pub capture_area: Option<Rect>,

    pub include_microphone: bool,
    pub include_system_audio: bool,
    pub capture_camera: bool,
    pub camera_device_id: Option<String>,
    pub audio_device_id: Option<String>,
    pub system_audio_device_id: Option<String>,

    /// Render the system cursor into the video.
    pub capture_cursor: bool,

    /// Run the cursor sampler.
    pub track_cursor: bool,

    pub frame_rate: u32,
    pub quality: String,

    /// Shared anchor imposed by a coordinating parent.
    pub session_timestamp: Option<u64>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self::from_defaults(&RecordingDefaults::default())
    }
}

impl RecordingOptions {
    pub fn from_defaults(defaults: &RecordingDefaults) -> Self {
        Self {
            display_id: None,
            window_id: None,
            capture_area: None,
            include_microphone: defaults.include_microphone,
            include_system_audio: defaults.include_system_audio,
            capture_camera: false,
            camera_device_id: None,
            audio_device_id: None,
            system_audio_device_id: None,
            capture_cursor: defaults.capture_cursor,
            track_cursor: defaults.track_cursor,
            frame_rate: defaults.frame_rate,
            quality: defaults.quality.clone(),
            session_timestamp: None,
        }
    }

    fn wants_audio(&self) -> bool {
        self.include_microphone || self.include_system_audio
    }

    fn native(&self, target: &ResolvedTarget, paths: &SessionPaths) -> NativeRecordingOptions {
        NativeRecordingOptions {
            display_id: target.display_id,
            window_id: target.window_id,
            capture_area: target.capture_area,
            include_microphone: self.include_microphone,
            include_system_audio: self.include_system_audio,
            capture_camera: self.capture_camera,
            camera_device_id: self.camera_device_id.clone(),
            audio_device_id: self.audio_device_id.clone(),
            system_audio_device_id: self.system_audio_device_id.clone(),
            capture_cursor: self.capture_cursor,
            frame_rate: self.frame_rate,
            quality: self.quality.clone(),
            session_timestamp: paths.session_timestamp,
            camera_output_path: paths.camera.clone(),
            audio_output_path: paths.audio.clone(),
        }
    }
}

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_timestamp: u64,
    pub output_paths: SessionPaths,
    pub display_id: Option<u32>,
    pub window_id: Option<u32>,
    pub capture_area: Option<Rect>,
    pub cursor_tracking: bool,
}

/// Returned by stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    /// Whether the native stop call succeeded.
    pub success: bool,
    /// 0 on success, 1 otherwise.
    pub code: i32,
    pub session_timestamp: u64,
    pub output_paths: SessionPaths,
    pub duration_ms: u64,
    pub cursor: Option<SamplerStats>,
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    /// Active locally and confirmed by the backend.
    pub is_recording: bool,
    pub backend_confirmed: bool,
    pub session_timestamp: Option<u64>,
    pub output_paths: Option<SessionPaths>,
    pub recording_time_secs: u64,
    pub options: Option<RecordingOptions>,
}

/// Payload of [`SessionEvent::RecordingStarted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStarted {
    pub output_path: PathBuf,
    pub session_timestamp: u64,
    /// False when the backend never reported recording within the poll window.
    pub confirmed: bool,
    pub waited_ms: u64,
}

/// Events emitted by one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The native start call returned.
    Started(PathBuf),
    /// The backend reported that it is actually recording.
    RecordingStarted(RecordingStarted),
    /// Elapsed seconds since the session timestamp.
    TimeUpdate(u64),
    Stopped(StopResult),
    /// The screen file exists on disk after stop.
    Completed(PathBuf),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::RecordingStarted(_) => "recordingStarted",
            Self::TimeUpdate(_) => "timeUpdate",
            Self::Stopped(_) => "stopped",
            Self::Completed(_) => "completed",
        }
    }
}

struct ActiveSession {
    options: RecordingOptions,
    paths: SessionPaths,
    clock: SessionClock,
    sampler: Option<CursorSampler>,
    timers: CancellationToken,
}

/// Owns the lifecycle of one recording session.
pub struct CaptureSession {
    backend: Arc<dyn NativeBackend>,
    cursor_config: CursorConfig,
    state: watch::Sender<SessionState>,
    active: Option<ActiveSession>,
    last_paths: Option<SessionPaths>,
    confirmed: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn NativeBackend>, cursor_config: CursorConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            cursor_config,
            state,
            active: None,
            last_paths: None,
            confirmed: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.backend
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Start recording.
    ///
    /// Accepted from `Idle` or `Stopped`. On failure nothing is left
    /// running and the session returns to `Idle`.
    pub async fn start(
        &mut self,
        output_path: &Path,
        options: RecordingOptions,
    ) -> CapsyncResult<SessionResult> {
        let state = self.state();
        if !matches!(state, SessionState::Idle | SessionState::Stopped) {
            return Err(CapsyncError::AlreadyInProgress);
        }
        if output_path.as_os_str().is_empty() {
            return Err(CapsyncError::invalid_argument("output path is required"));
        }

        self.set_state(SessionState::Starting);
        match self.start_inner(output_path, options).await {
            Ok(result) => {
                self.set_state(SessionState::Active);
                Ok(result)
            }
            Err(e) => {
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn start_inner(
        &mut self,
        output_path: &Path,
        options: RecordingOptions,
    ) -> CapsyncResult<SessionResult> {
        let target = resolve_target(self.backend.as_ref(), &options);

        let session_timestamp = options.session_timestamp.unwrap_or_else(unix_time_ms);
        let clock = SessionClock::anchored_at(session_timestamp);
        let mut paths = SessionPaths::derive(
            output_path,
            session_timestamp,
            options.capture_camera,
            options.wants_audio(),
            options.track_cursor.then_some(self.cursor_config.log_format),
        );

        tracing::info!(
            session_timestamp,
            screen = %paths.screen.display(),
            window_id = ?target.window_id,
            display_id = ?target.display_id,
            "Starting capture session"
        );

        if let Some(dir) = paths.screen.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let native = options.native(&target, &paths);
        let started = match self.backend.start_recording(&paths.screen, &native) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CapsyncError::backend_start(
                "backend refused to start; check permissions and output path",
            )),
            Err(e @ CapsyncError::BackendStartFailed { .. }) => Err(e),
            Err(e) => Err(CapsyncError::backend_start(e.to_string())),
        };
        if let Err(e) = started {
            tracing::error!(error = %e, session_timestamp, "Native start failed, rolling back");
            remove_temp_files(&paths);
            return Err(e);
        }
        self.confirmed.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Started(paths.screen.clone()));

        let sampler = match paths.cursor.clone() {
            Some(cursor_path) => {
                let mut sampler = CursorSampler::new(
                    Arc::new(BackendPointer(self.backend.clone())),
                    self.cursor_config.clone(),
                );
                let context = SamplingContext::for_recording(target.display, target.mode);
                match sampler.start(cursor_path, context, clock.clone()) {
                    Ok(()) => Some(sampler),
                    Err(e) => {
                        let e = match e {
                            e @ CapsyncError::CursorCaptureFailed { .. } => e,
                            other => CapsyncError::cursor_capture(other.to_string()),
                        };
                        tracing::warn!(error = %e, "Recording continues without cursor data");
                        paths.cursor = None;
                        None
                    }
                }
            }
            None => None,
        };

        let timers = CancellationToken::new();
        tokio::spawn(heartbeat(
            clock.clone(),
            self.events.clone(),
            timers.clone(),
        ));
        tokio::spawn(confirm_started(
            self.backend.clone(),
            self.events.clone(),
            self.confirmed.clone(),
            timers.clone(),
            paths.screen.clone(),
            session_timestamp,
        ));

        let result = SessionResult {
            session_timestamp,
            output_paths: paths.clone(),
            display_id: target.display_id,
            window_id: target.window_id,
            capture_area: target.capture_area,
            cursor_tracking: sampler.is_some(),
        };

        self.active = Some(ActiveSession {
            options,
            paths,
            clock,
            sampler,
            timers,
        });

        tracing::info!(session_timestamp, "Capture session started");
        Ok(result)
    }

    /// Stop recording.
    ///
    /// Cursor first, then the backend, then timers. The session always ends
    /// in `Stopped`, even if the native stop call fails.
    pub async fn stop(&mut self) -> CapsyncResult<StopResult> {
        let state = self.state();
        if state != SessionState::Active {
            return Err(CapsyncError::not_recording(state));
        }
        let Some(mut active) = self.active.take() else {
            self.set_state(SessionState::Idle);
            return Err(CapsyncError::not_recording(state));
        };

        self.set_state(SessionState::Stopping);
        tracing::info!(session_timestamp = active.paths.session_timestamp, "Stopping capture session");

        let cursor = match active.sampler.take() {
            Some(mut sampler) => match sampler.stop().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!(error = %e, "Cursor sampler did not shut down cleanly");
                    None
                }
            },
            None => None,
        };

        let success = match self.backend.stop_recording() {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Backend reported no active recording on stop");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Native stop failed");
                false
            }
        };

        active.timers.cancel();

        let mut paths = active.paths;
        match self.backend.recording_status() {
            Ok(status) => {
                if let Some(camera) = status.camera_output_path {
                    paths.camera = Some(camera);
                }
                if let Some(audio) = status.audio_output_path {
                    paths.audio = Some(audio);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not reconcile output paths"),
        }

        let result = StopResult {
            success,
            code: if success { 0 } else { 1 },
            session_timestamp: paths.session_timestamp,
            output_paths: paths.clone(),
            duration_ms: active.clock.elapsed_ms(),
            cursor,
        };

        self.last_paths = Some(paths);
        self.set_state(SessionState::Stopped);
        let _ = self.events.send(SessionEvent::Stopped(result.clone()));

        if success {
            let events = self.events.clone();
            let screen = result.output_paths.screen.clone();
            tokio::spawn(async move {
                tokio::time::sleep(COMPLETION_DELAY).await;
                if screen.exists() {
                    let _ = events.send(SessionEvent::Completed(screen));
                }
            });
        }

        tracing::info!(
            success,
            duration_ms = result.duration_ms,
            cursor_events = result.cursor.map(|c| c.events_written).unwrap_or(0),
            "Capture session stopped"
        );
        Ok(result)
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        let backend_recording = match self.backend.recording_status() {
            Ok(status) => status.is_recording,
            Err(e) => {
                tracing::debug!(error = %e, "Backend status unavailable");
                false
            }
        };

        match &self.active {
            Some(active) => SessionStatus {
                state,
                is_recording: state == SessionState::Active && backend_recording,
                backend_confirmed: self.confirmed.load(Ordering::SeqCst),
                session_timestamp: Some(active.paths.session_timestamp),
                output_paths: Some(active.paths.clone()),
                recording_time_secs: active.clock.elapsed_secs(),
                options: Some(active.options.clone()),
            },
            None => SessionStatus {
                state,
                is_recording: false,
                backend_confirmed: false,
                session_timestamp: self.last_paths.as_ref().map(|p| p.session_timestamp),
                output_paths: self.last_paths.clone(),
                recording_time_secs: 0,
                options: None,
            },
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.timers.cancel();
            tracing::warn!(
                session_timestamp = active.paths.session_timestamp,
                "Capture session dropped while recording"
            );
        }
    }
}

fn remove_temp_files(paths: &SessionPaths) {
    for path in paths.camera.iter().chain(paths.audio.iter()) {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
        }
    }
}

async fn heartbeat(
    clock: SessionClock,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let _ = events.send(SessionEvent::TimeUpdate(clock.elapsed_secs()));
            }
        }
    }
}

async fn confirm_started(
    backend: Arc<dyn NativeBackend>,
    events: broadcast::Sender<SessionEvent>,
    confirmed: Arc<AtomicBool>,
    cancel: CancellationToken,
    output_path: PathBuf,
    session_timestamp: u64,
) {
    let began = Instant::now();
    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    let deadline = tokio::time::sleep(STATUS_CONFIRM_TIMEOUT);
    tokio::pin!(deadline);

    let is_confirmed = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut deadline => break false,
            _ = ticker.tick() => match backend.recording_status() {
                Ok(status) if status.is_recording => break true,
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Status poll failed"),
            },
        }
    };

    let waited_ms = began.elapsed().as_millis() as u64;
    if is_confirmed {
        confirmed.store(true, Ordering::SeqCst);
        tracing::info!(waited_ms, "Backend confirmed recording");
    } else {
        tracing::warn!(waited_ms, "Backend did not confirm recording in time");
    }

    let _ = events.send(SessionEvent::RecordingStarted(RecordingStarted {
        output_path,
        session_timestamp,
        confirmed: is_confirmed,
        waited_ms,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;

    #[test]
    fn test_options_default_to_tracking_cursor() {
        let options = RecordingOptions::default();
        assert!(options.track_cursor);
        assert!(!options.capture_cursor);
        assert_eq!(options.frame_rate, 60);
    }

    #[test]
    fn test_options_accept_partial_json() {
        let options: RecordingOptions =
            serde_json::from_str(r#"{"windowId": 5, "includeMicrophone": true}"#).unwrap();
        assert_eq!(options.window_id, Some(5));
        assert!(options.include_microphone);
        assert!(options.track_cursor);
    }

    #[test]
    fn test_event_wire_shape() {
        let value = serde_json::to_value(SessionEvent::TimeUpdate(3)).unwrap();
        assert_eq!(value, serde_json::json!({"event": "timeUpdate", "data": 3}));
        assert_eq!(SessionEvent::TimeUpdate(3).name(), "timeUpdate");
    }

    #[tokio::test]
    async fn test_empty_output_path_is_rejected() {
        let mut session = CaptureSession::new(Arc::new(SimulatedBackend::new()), CursorConfig::default());
        let err = session
            .start(Path::new(""), RecordingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapsyncError::InvalidArgument { .. }));
        assert_eq!(session.state(), SessionState::Idle);
    }
}
