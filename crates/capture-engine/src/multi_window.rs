//! Multi-window recording.
//!
//! Records several windows at once, one recorder per window. Windows are
//! started one after another with a settling delay in between, all under
//! one shared start time. Cursor tracking runs once, in global
//! coordinates, for the whole desktop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use capsync_common::clock::SessionClock;
use capsync_common::config::{CursorConfig, MultiWindowConfig};
use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_input_tracker::{CursorSampler, SamplingContext};
use capsync_platform_core::{PointerSource, WindowInfo};
use capsync_project_model::metadata::{
    MetadataOptions, SessionMetadata, WindowEntry, METADATA_VERSION,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::paths::{temp_path, window_output_path};
use crate::recorder::{Recorder, RecorderFactory};
use crate::session::RecordingOptions;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Options shared by every window of a multi-window recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiWindowOptions {
    pub frame_rate: u32,
    pub quality: String,
    /// Render the system cursor into each window video.
    pub capture_cursor: bool,
    pub enable_microphone: bool,
    pub microphone_device_id: Option<String>,
    pub capture_system_audio: bool,
    pub enable_camera: bool,
    pub camera_device_id: Option<String>,
    pub track_cursor: bool,
}

impl Default for MultiWindowOptions {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            quality: "high".to_string(),
            capture_cursor: false,
            enable_microphone: false,
            microphone_device_id: None,
            capture_system_audio: false,
            enable_camera: false,
            camera_device_id: None,
            track_cursor: true,
        }
    }
}

impl MultiWindowOptions {
    /// Per-window options. Audio and camera belong to the first window.
    fn for_window(&self, index: usize, window: &WindowInfo, session_timestamp: u64) -> RecordingOptions {
        let first = index == 0;
        RecordingOptions {
            window_id: Some(window.id),
            frame_rate: self.frame_rate,
            quality: self.quality.clone(),
            capture_cursor: self.capture_cursor,
            track_cursor: false,
            session_timestamp: Some(session_timestamp),
            include_microphone: first && self.enable_microphone,
            audio_device_id: self.microphone_device_id.clone().filter(|_| first),
            include_system_audio: first && self.capture_system_audio,
            system_audio_device_id: None,
            capture_camera: first && self.enable_camera,
            camera_device_id: self.camera_device_id.clone().filter(|_| first),
            ..RecordingOptions::default()
        }
    }

    fn metadata_options(&self) -> MetadataOptions {
        MetadataOptions {
            enable_camera: self.enable_camera,
            camera_device_id: self.camera_device_id.clone(),
            enable_microphone: self.enable_microphone,
            microphone_device_id: self.microphone_device_id.clone(),
            capture_system_audio: self.capture_system_audio,
            track_cursor: self.track_cursor,
        }
    }
}

/// Events emitted while recording several windows.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiWindowEvent {
    RecorderStarted {
        index: usize,
        window: WindowInfo,
        output_path: PathBuf,
        cursor_file_path: Option<PathBuf>,
        timestamp: u64,
    },
    AllStarted(MultiWindowStart),
    TimeUpdate(u64),
    RecorderStopped {
        index: usize,
        output_path: Option<PathBuf>,
    },
    RecorderError {
        index: usize,
        error: String,
    },
    AllStopped(MultiWindowStop),
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiWindowStart {
    pub window_count: usize,
    pub output_files: Vec<PathBuf>,
    pub start_time: u64,
    pub sync_timestamps: Vec<u64>,
    pub cursor_file: Option<PathBuf>,
}

/// Stop outcome for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStopOutcome {
    pub index: usize,
    pub success: bool,
    pub error: Option<String>,
}

/// Returned by stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiWindowStop {
    pub success: bool,
    pub window_count: usize,
    pub output_files: Vec<PathBuf>,
    pub cursor_files: Vec<PathBuf>,
    pub camera_file: Option<PathBuf>,
    pub audio_file: Option<PathBuf>,
    pub duration_ms: u64,
    pub windows: Vec<WindowStopOutcome>,
    pub metadata: SessionMetadata,
}

/// One window entry of [`MultiWindowStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStatus {
    pub index: usize,
    pub window: WindowInfo,
    pub recorder: String,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiWindowStatus {
    pub is_recording: bool,
    pub window_count: usize,
    pub start_time: Option<u64>,
    pub output_files: Vec<PathBuf>,
    pub cursor_file: Option<PathBuf>,
    pub camera_file: Option<PathBuf>,
    pub audio_file: Option<PathBuf>,
    pub windows: Vec<WindowStatus>,
}

struct WindowSlot {
    recorder: Box<dyn Recorder>,
    window: WindowInfo,
    output_path: Option<PathBuf>,
    sync_timestamp: Option<u64>,
}

/// Sequences one recorder per window under a shared start time.
pub struct MultiWindowRecorder {
    factory: Arc<dyn RecorderFactory>,
    pointer: Arc<dyn PointerSource>,
    cursor_config: CursorConfig,
    config: MultiWindowConfig,
    options: MultiWindowOptions,
    slots: Vec<WindowSlot>,
    recording: bool,
    clock: Option<SessionClock>,
    cursor: Option<CursorSampler>,
    cursor_file: Option<PathBuf>,
    camera_file: Option<PathBuf>,
    audio_file: Option<PathBuf>,
    output_files: Vec<PathBuf>,
    timer: Option<CancellationToken>,
    last_metadata: Option<SessionMetadata>,
    events: broadcast::Sender<MultiWindowEvent>,
}

impl MultiWindowRecorder {
    pub fn new(
        factory: Arc<dyn RecorderFactory>,
        pointer: Arc<dyn PointerSource>,
        cursor_config: CursorConfig,
        config: MultiWindowConfig,
        options: MultiWindowOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            factory,
            pointer,
            cursor_config,
            config,
            options,
            slots: Vec::new(),
            recording: false,
            clock: None,
            cursor: None,
            cursor_file: None,
            camera_file: None,
            audio_file: None,
            output_files: Vec::new(),
            timer: None,
            last_metadata: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MultiWindowEvent> {
        self.events.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn window_count(&self) -> usize {
        self.slots.len()
    }

    /// Register a window and create its recorder. Returns the window index.
    pub async fn add_window(&mut self, window: WindowInfo) -> CapsyncResult<usize> {
        if self.recording {
            return Err(CapsyncError::AlreadyInProgress);
        }
        let recorder = self.factory.create(&window).await?;
        let index = self.slots.len();
        tracing::info!(index, window_id = window.id, app = %window.app_name, recorder = %recorder.label(), "Window added");
        self.slots.push(WindowSlot {
            recorder,
            window,
            output_path: None,
            sync_timestamp: None,
        });
        Ok(index)
    }

    /// Remove a window and release its recorder. Later indices shift down.
    pub async fn remove_window(&mut self, index: usize) -> CapsyncResult<()> {
        if self.recording {
            return Err(CapsyncError::AlreadyInProgress);
        }
        if index >= self.slots.len() {
            return Err(CapsyncError::invalid_argument(format!(
                "invalid window index: {index}"
            )));
        }
        let mut slot = self.slots.remove(index);
        if let Err(e) = slot.recorder.shutdown().await {
            tracing::warn!(index, error = %e, "Recorder shutdown failed");
        }
        tracing::info!(index, app = %slot.window.app_name, "Window removed");
        Ok(())
    }

    /// Start every window, in order.
    ///
    /// `options` replaces the recorder's options when given. If window `k`
    /// fails, windows `0..k` and the cursor sampler are stopped before the
    /// error is returned.
    pub async fn start_recording(
        &mut self,
        output_dir: &Path,
        options: Option<MultiWindowOptions>,
    ) -> CapsyncResult<MultiWindowStart> {
        if self.recording {
            return Err(CapsyncError::AlreadyInProgress);
        }
        if self.slots.is_empty() {
            return Err(CapsyncError::invalid_argument(
                "no windows added, call add_window first",
            ));
        }
        if let Some(options) = options {
            self.options = options;
        }
        std::fs::create_dir_all(output_dir)?;

        let clock = SessionClock::start();
        let start_time = clock.session_timestamp_ms();
        let count = self.slots.len();

        self.output_files.clear();
        self.cursor_file = None;
        self.camera_file = None;
        self.audio_file = None;
        for slot in &mut self.slots {
            slot.output_path = None;
            slot.sync_timestamp = None;
        }

        tracing::info!(count, start_time, dir = %output_dir.display(), "Starting multi-window recording");

        for index in 0..count {
            let window = self.slots[index].window.clone();
            let output_path = window_output_path(output_dir, index, &window.app_name, start_time);
            let recording_options = self.options.for_window(index, &window, start_time);

            if index == 0 {
                if self.options.enable_camera {
                    self.camera_file = Some(temp_path(output_dir, "camera", start_time, "mov"));
                }
                if self.options.enable_microphone || self.options.capture_system_audio {
                    self.audio_file = Some(temp_path(output_dir, "audio", start_time, "mov"));
                }
            }

            let sync_timestamp = clock.now_ms();
            let started = self.slots[index]
                .recorder
                .start(&output_path, recording_options)
                .await;

            let result = match started {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(index, error = %e, "Recorder failed to start, rolling back");
                    self.roll_back(index).await;
                    return Err(CapsyncError::backend_start(format!(
                        "failed to start recorder {}: {e}",
                        index + 1
                    )));
                }
            };

            let screen = result.output_paths.screen;
            self.slots[index].output_path = Some(screen.clone());
            self.slots[index].sync_timestamp = Some(sync_timestamp);
            self.output_files.push(screen.clone());
            tracing::info!(index, path = %screen.display(), "Recorder started");

            if index == 0 && self.options.track_cursor {
                self.start_cursor(output_dir, &clock);
            }

            let _ = self.events.send(MultiWindowEvent::RecorderStarted {
                index,
                window,
                output_path: screen,
                cursor_file_path: self.cursor_file.clone(),
                timestamp: sync_timestamp,
            });

            let settle = if index + 1 < count {
                self.config.settle_delay()
            } else {
                self.config.final_settle_delay()
            };
            if settle > Duration::ZERO {
                tracing::debug!(settle_ms = settle.as_millis() as u64, "Waiting for backend to settle");
                tokio::time::sleep(settle).await;
            }
        }

        let timer = CancellationToken::new();
        tokio::spawn(time_updates(clock.clone(), self.events.clone(), timer.clone()));
        self.timer = Some(timer);
        self.clock = Some(clock);
        self.recording = true;

        let start = MultiWindowStart {
            window_count: count,
            output_files: self.output_files.clone(),
            start_time,
            sync_timestamps: self.slots.iter().filter_map(|s| s.sync_timestamp).collect(),
            cursor_file: self.cursor_file.clone(),
        };
        let _ = self.events.send(MultiWindowEvent::AllStarted(start.clone()));
        tracing::info!(count, "All window recorders started");
        Ok(start)
    }

    fn start_cursor(&mut self, output_dir: &Path, clock: &SessionClock) {
        let path = temp_path(
            output_dir,
            "cursor",
            clock.session_timestamp_ms(),
            self.cursor_config.log_format.extension(),
        );
        let windows = self.slots.iter().map(|s| s.window.clone()).collect();
        let mut sampler = CursorSampler::new(self.pointer.clone(), self.cursor_config.clone());
        match sampler.start(path.clone(), SamplingContext::global(windows), clock.clone()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Global cursor tracking started");
                self.cursor = Some(sampler);
                self.cursor_file = Some(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recording continues without cursor data");
            }
        }
    }

    async fn stop_cursor(&mut self) {
        if let Some(mut sampler) = self.cursor.take() {
            match sampler.stop().await {
                Ok(stats) => tracing::info!(events = stats.events_written, "Cursor tracking stopped"),
                Err(e) => tracing::warn!(error = %e, "Failed to stop cursor tracking"),
            }
        }
    }

    async fn roll_back(&mut self, failed: usize) {
        for index in 0..failed {
            if let Err(e) = self.slots[index].recorder.stop().await {
                tracing::error!(index, error = %e, "Failed to stop recorder during rollback");
            }
        }
        self.stop_cursor().await;
        self.output_files.clear();
        self.cursor_file = None;
        self.camera_file = None;
        self.audio_file = None;
        for slot in &mut self.slots {
            slot.output_path = None;
            slot.sync_timestamp = None;
        }
    }

    /// Stop every window. Recorders are stopped in parallel after the
    /// cursor sampler.
    pub async fn stop_recording(&mut self) -> CapsyncResult<MultiWindowStop> {
        if !self.recording {
            return Err(CapsyncError::not_recording("idle"));
        }
        let Some(clock) = self.clock.clone() else {
            return Err(CapsyncError::not_recording("idle"));
        };

        let count = self.slots.len();
        tracing::info!(count, "Stopping multi-window recording");
        let stop_time = clock.now_ms();

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.stop_cursor().await;

        let stops = self.slots.iter_mut().enumerate().map(|(index, slot)| async move {
            (index, slot.recorder.stop().await)
        });
        let results = futures::future::join_all(stops).await;

        let mut outcomes = Vec::with_capacity(count);
        for (index, result) in results {
            let outcome = match result {
                Ok(stop) => {
                    let _ = self.events.send(MultiWindowEvent::RecorderStopped {
                        index,
                        output_path: self.slots[index].output_path.clone(),
                    });
                    WindowStopOutcome {
                        index,
                        success: stop.success,
                        error: (!stop.success).then(|| "native stop failed".to_string()),
                    }
                }
                Err(e) => {
                    tracing::error!(index, error = %e, "Recorder failed to stop");
                    let _ = self.events.send(MultiWindowEvent::RecorderError {
                        index,
                        error: e.to_string(),
                    });
                    WindowStopOutcome {
                        index,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        self.recording = false;

        if let Some(first) = self.slots.first_mut() {
            match first.recorder.status().await {
                Ok(status) => {
                    if let Some(paths) = status.output_paths {
                        if paths.camera.is_some() {
                            self.camera_file = paths.camera;
                        }
                        if paths.audio.is_some() {
                            self.audio_file = paths.audio;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Could not read camera/audio paths from first recorder"),
            }
        }

        let duration_ms = stop_time.saturating_sub(clock.session_timestamp_ms());
        let metadata = self.build_metadata(clock.session_timestamp_ms(), duration_ms);
        self.last_metadata = Some(metadata.clone());
        self.clock = None;

        let result = MultiWindowStop {
            success: outcomes.iter().all(|o| o.success),
            window_count: count,
            output_files: self.output_files.clone(),
            cursor_files: self.cursor_file.iter().cloned().collect(),
            camera_file: self.camera_file.clone(),
            audio_file: self.audio_file.clone(),
            duration_ms,
            windows: outcomes,
            metadata,
        };

        let _ = self.events.send(MultiWindowEvent::AllStopped(result.clone()));
        tracing::info!(success = result.success, duration_ms, "Multi-window recording stopped");
        Ok(result)
    }

    fn build_metadata(&self, start_time: u64, duration: u64) -> SessionMetadata {
        let windows = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let sync_timestamp = slot.sync_timestamp.unwrap_or(start_time);
                WindowEntry {
                    index,
                    window_id: slot.window.id,
                    app_name: slot.window.app_name.clone(),
                    title: slot.window.title.clone(),
                    output_path: slot.output_path.clone(),
                    cursor_file_path: self.cursor_file.clone(),
                    sync_timestamp,
                    sync_offset: sync_timestamp.saturating_sub(start_time),
                    layout_row: index,
                }
            })
            .collect();

        SessionMetadata {
            version: METADATA_VERSION.to_string(),
            timestamp: start_time,
            duration,
            windows,
            options: self.options.metadata_options(),
        }
    }

    /// Metadata for the current recording, or the last finished one.
    pub fn metadata(&self) -> Option<SessionMetadata> {
        match &self.clock {
            Some(clock) => Some(self.build_metadata(clock.session_timestamp_ms(), clock.elapsed_ms())),
            None => self.last_metadata.clone(),
        }
    }

    pub fn status(&self) -> MultiWindowStatus {
        MultiWindowStatus {
            is_recording: self.recording,
            window_count: self.slots.len(),
            start_time: self.clock.as_ref().map(|c| c.session_timestamp_ms()),
            output_files: self.output_files.clone(),
            cursor_file: self.cursor_file.clone(),
            camera_file: self.camera_file.clone(),
            audio_file: self.audio_file.clone(),
            windows: self
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| WindowStatus {
                    index,
                    window: slot.window.clone(),
                    recorder: slot.recorder.label(),
                    output_path: slot.output_path.clone(),
                })
                .collect(),
        }
    }

    /// Stop anything still running and release every recorder.
    pub async fn destroy(&mut self) {
        if self.recording {
            if let Err(e) = self.stop_recording().await {
                tracing::warn!(error = %e, "Stop during destroy failed");
            }
        }
        for mut slot in self.slots.drain(..) {
            if let Err(e) = slot.recorder.shutdown().await {
                tracing::warn!(app = %slot.window.app_name, error = %e, "Recorder shutdown failed");
            }
        }
    }
}

async fn time_updates(
    clock: SessionClock,
    events: broadcast::Sender<MultiWindowEvent>,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs(1);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let _ = events.send(MultiWindowEvent::TimeUpdate(clock.elapsed_secs()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: u32) -> WindowInfo {
        WindowInfo {
            id,
            app_name: "App".to_string(),
            title: String::new(),
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        }
    }

    #[test]
    fn test_audio_and_camera_only_on_first_window() {
        let options = MultiWindowOptions {
            enable_camera: true,
            enable_microphone: true,
            camera_device_id: Some("cam".to_string()),
            microphone_device_id: Some("mic".to_string()),
            ..Default::default()
        };

        let first = options.for_window(0, &window(1), 42);
        assert!(first.capture_camera && first.include_microphone);
        assert_eq!(first.camera_device_id.as_deref(), Some("cam"));
        assert_eq!(first.session_timestamp, Some(42));
        assert!(!first.track_cursor);

        let second = options.for_window(1, &window(2), 42);
        assert!(!second.capture_camera && !second.include_microphone);
        assert_eq!(second.audio_device_id, None);
        assert_eq!(second.window_id, Some(2));
    }
}
