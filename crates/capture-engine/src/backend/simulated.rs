//! Simulated native backend.
//!
//! Stands in for the OS capture engine: reports a fixed desktop, writes
//! placeholder media files and moves a synthetic pointer. Like the real
//! engine it has exactly one recording slot, which can be shared between
//! instances to reproduce the one-session-per-process limit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_input_tracker::backends::ScriptedPointerSource;
use capsync_platform_core::{
    primary_display, BackendStatus, DisplayInfo, NativeBackend, NativeRecordingOptions,
    PointerEventType, PointerSample, PointerSource, WindowInfo,
};
use tokio::time::Instant;

const PLACEHOLDER: &[u8] = b"capsync simulated capture\n";

static PROCESS_SLOT: OnceLock<Arc<RecordingSlot>> = OnceLock::new();

#[derive(Debug, Clone)]
struct ActiveRecording {
    screen: PathBuf,
    camera: Option<PathBuf>,
    audio: Option<PathBuf>,
    started_at: Instant,
}

/// The single recording slot of a backend.
#[derive(Debug, Default)]
pub struct RecordingSlot(Mutex<Option<ActiveRecording>>);

impl RecordingSlot {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_occupied(&self) -> bool {
        self.0.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> CapsyncResult<MutexGuard<'_, Option<ActiveRecording>>> {
        self.0
            .lock()
            .map_err(|_| CapsyncError::Other(anyhow::anyhow!("recording slot lock poisoned")))
    }
}

/// How the next start call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    /// The backend returns `false`.
    Refuse,
    /// The backend raises an error.
    Error,
}

pub struct SimulatedBackend {
    displays: Vec<DisplayInfo>,
    windows: Vec<WindowInfo>,
    slot: Arc<RecordingSlot>,
    finished: Mutex<Option<ActiveRecording>>,
    pointer: Option<ScriptedPointerSource>,
    created_at: Instant,
    confirm_delay: Duration,
    fail_next_start: Mutex<Option<StartFailure>>,
    fail_next_stop: AtomicBool,
    start_calls: AtomicU64,
    idle_pointer_reads: AtomicU64,
    last_options: Mutex<Option<NativeRecordingOptions>>,
}

impl SimulatedBackend {
    /// A backend with its own recording slot.
    pub fn new() -> Self {
        Self {
            displays: default_displays(),
            windows: default_windows(),
            slot: RecordingSlot::new_shared(),
            finished: Mutex::new(None),
            pointer: None,
            created_at: Instant::now(),
            confirm_delay: Duration::from_millis(120),
            fail_next_start: Mutex::new(None),
            fail_next_stop: AtomicBool::new(false),
            start_calls: AtomicU64::new(0),
            idle_pointer_reads: AtomicU64::new(0),
            last_options: Mutex::new(None),
        }
    }

    /// A backend bound to the process-wide recording slot.
    pub fn process_shared() -> Self {
        let slot = PROCESS_SLOT.get_or_init(RecordingSlot::new_shared).clone();
        Self::new().with_shared_slot(slot)
    }

    pub fn with_shared_slot(mut self, slot: Arc<RecordingSlot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_displays(mut self, displays: Vec<DisplayInfo>) -> Self {
        self.displays = displays;
        self
    }

    /// Windows in front-to-back order.
    pub fn with_windows(mut self, windows: Vec<WindowInfo>) -> Self {
        self.windows = windows;
        self
    }

    /// Replace the animated pointer with a script.
    pub fn with_pointer_script(mut self, script: Vec<Option<PointerSample>>) -> Self {
        self.pointer = Some(ScriptedPointerSource::new(script));
        self
    }

    /// How long after a start the backend keeps reporting "not yet recording".
    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn fail_next_start(&self, failure: StartFailure) {
        if let Ok(mut next) = self.fail_next_start.lock() {
            *next = Some(failure);
        }
    }

    pub fn fail_next_stop(&self) {
        self.fail_next_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.slot.is_occupied()
    }

    pub fn start_calls(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Pointer reads served while no recording was active.
    pub fn idle_pointer_reads(&self) -> u64 {
        self.idle_pointer_reads.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent start call.
    pub fn last_options(&self) -> Option<NativeRecordingOptions> {
        self.last_options.lock().ok().and_then(|o| o.clone())
    }

    fn animated_sample(&self) -> PointerSample {
        let (cx, cy, w, h) = primary_display(&self.displays)
            .map(|d| (d.x + d.width / 2.0, d.y + d.height / 2.0, d.width, d.height))
            .unwrap_or((960.0, 540.0, 1920.0, 1080.0));

        let elapsed = self.created_at.elapsed();
        let t = elapsed.as_secs_f64();
        let x = (cx + 0.35 * w * (t * 0.9).sin()).round();
        let y = (cy + 0.35 * h * (t * 1.3).sin()).round();

        let over_window = self.windows.iter().any(|win| win.bounds().contains(x, y));
        let event_type = if elapsed.as_millis() % 3000 < 60 {
            PointerEventType::MouseDown
        } else {
            PointerEventType::Move
        };

        PointerSample::new(x, y)
            .with_cursor_type(if over_window { "pointer" } else { "default" })
            .with_event_type(event_type)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn write_placeholder(path: &Path) -> CapsyncResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, PLACEHOLDER)?;
    Ok(())
}

impl PointerSource for SimulatedBackend {
    fn cursor_position(&self) -> CapsyncResult<PointerSample> {
        if !self.slot.is_occupied() {
            self.idle_pointer_reads.fetch_add(1, Ordering::SeqCst);
        }
        match &self.pointer {
            Some(script) => script.cursor_position(),
            None => Ok(self.animated_sample()),
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl NativeBackend for SimulatedBackend {
    fn displays(&self) -> CapsyncResult<Vec<DisplayInfo>> {
        Ok(self.displays.clone())
    }

    fn windows(&self) -> CapsyncResult<Vec<WindowInfo>> {
        Ok(self.windows.clone())
    }

    fn start_recording(
        &self,
        screen_path: &Path,
        options: &NativeRecordingOptions,
    ) -> CapsyncResult<bool> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_options.lock() {
            *last = Some(options.clone());
        }

        let failure = self.fail_next_start.lock().ok().and_then(|mut f| f.take());
        match failure {
            Some(StartFailure::Refuse) => return Ok(false),
            Some(StartFailure::Error) => {
                return Err(CapsyncError::backend_start("simulated start failure"))
            }
            None => {}
        }

        let mut slot = self.slot.lock()?;
        if slot.is_some() {
            tracing::warn!(path = %screen_path.display(), "Simulated backend slot is busy");
            return Ok(false);
        }

        write_placeholder(screen_path)?;
        let camera = match (&options.camera_output_path, options.capture_camera) {
            (Some(path), true) => {
                write_placeholder(path)?;
                Some(path.clone())
            }
            _ => None,
        };
        let wants_audio = options.include_microphone || options.include_system_audio;
        let audio = match (&options.audio_output_path, wants_audio) {
            (Some(path), true) => {
                write_placeholder(path)?;
                Some(path.clone())
            }
            _ => None,
        };

        *slot = Some(ActiveRecording {
            screen: screen_path.to_path_buf(),
            camera,
            audio,
            started_at: Instant::now(),
        });

        tracing::debug!(path = %screen_path.display(), "Simulated recording started");
        Ok(true)
    }

    fn stop_recording(&self) -> CapsyncResult<bool> {
        let active = self.slot.lock()?.take();
        if self.fail_next_stop.swap(false, Ordering::SeqCst) {
            return Err(CapsyncError::Other(anyhow::anyhow!(
                "simulated stop failure"
            )));
        }

        let Some(active) = active else {
            return Ok(false);
        };
        tracing::debug!(path = %active.screen.display(), "Simulated recording stopped");
        if let Ok(mut finished) = self.finished.lock() {
            *finished = Some(active);
        }
        Ok(true)
    }

    fn recording_status(&self) -> CapsyncResult<BackendStatus> {
        if let Some(active) = self.slot.lock()?.as_ref() {
            return Ok(BackendStatus {
                is_recording: active.started_at.elapsed() >= self.confirm_delay,
                output_path: Some(active.screen.clone()),
                camera_output_path: active.camera.clone(),
                audio_output_path: active.audio.clone(),
            });
        }

        let finished = self.finished.lock().ok().and_then(|f| f.clone());
        Ok(BackendStatus {
            is_recording: false,
            output_path: finished.as_ref().map(|r| r.screen.clone()),
            camera_output_path: finished.as_ref().and_then(|r| r.camera.clone()),
            audio_output_path: finished.and_then(|r| r.audio),
        })
    }
}

fn default_displays() -> Vec<DisplayInfo> {
    vec![
        DisplayInfo {
            id: 1,
            name: "Built-in Display".to_string(),
            x: 0.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
            scale_factor: 2.0,
            is_primary: true,
        },
        DisplayInfo {
            id: 2,
            name: "External Display".to_string(),
            x: 1920.0,
            y: 0.0,
            width: 2560.0,
            height: 1440.0,
            scale_factor: 1.0,
            is_primary: false,
        },
    ]
}

fn default_windows() -> Vec<WindowInfo> {
    vec![
        WindowInfo {
            id: 101,
            app_name: "Terminal".to_string(),
            title: "zsh".to_string(),
            x: 100.0,
            y: 100.0,
            width: 800.0,
            height: 600.0,
        },
        WindowInfo {
            id: 102,
            app_name: "Web Browser".to_string(),
            title: "Docs".to_string(),
            x: 2120.0,
            y: 150.0,
            width: 1600.0,
            height: 1000.0,
        },
        WindowInfo {
            id: 103,
            app_name: "Code Editor".to_string(),
            title: "main.rs".to_string(),
            x: 400.0,
            y: 300.0,
            width: 1200.0,
            height: 700.0,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_slot_allows_one_recording() {
        let dir = tempfile::tempdir().unwrap();
        let slot = RecordingSlot::new_shared();
        let a = SimulatedBackend::new().with_shared_slot(slot.clone());
        let b = SimulatedBackend::new().with_shared_slot(slot.clone());

        let opts = NativeRecordingOptions::default();
        assert!(a.start_recording(&dir.path().join("a.mov"), &opts).unwrap());
        assert!(!b.start_recording(&dir.path().join("b.mov"), &opts).unwrap());
        assert!(slot.is_occupied());

        assert!(a.stop_recording().unwrap());
        assert!(b.start_recording(&dir.path().join("b.mov"), &opts).unwrap());
    }

    #[test]
    fn start_writes_requested_media_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::new().with_confirm_delay(Duration::ZERO);
        let opts = NativeRecordingOptions {
            capture_camera: true,
            include_microphone: true,
            camera_output_path: Some(dir.path().join("temp_camera_1.mov")),
            audio_output_path: Some(dir.path().join("temp_audio_1.mov")),
            ..Default::default()
        };

        let screen = dir.path().join("screen-1.mov");
        assert!(backend.start_recording(&screen, &opts).unwrap());
        assert!(screen.exists());
        assert!(dir.path().join("temp_camera_1.mov").exists());

        let status = backend.recording_status().unwrap();
        assert!(status.is_recording);
        assert_eq!(status.audio_output_path, opts.audio_output_path);

        assert!(backend.stop_recording().unwrap());
        let status = backend.recording_status().unwrap();
        assert!(!status.is_recording);
        assert_eq!(status.camera_output_path, opts.camera_output_path);
    }

    #[test]
    fn scripted_failures_are_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::new();
        let opts = NativeRecordingOptions::default();
        let path = dir.path().join("s.mov");

        backend.fail_next_start(StartFailure::Refuse);
        assert!(!backend.start_recording(&path, &opts).unwrap());
        backend.fail_next_start(StartFailure::Error);
        assert!(backend.start_recording(&path, &opts).is_err());
        assert!(backend.start_recording(&path, &opts).unwrap());
        assert_eq!(backend.start_calls(), 3);

        backend.fail_next_stop();
        assert!(backend.stop_recording().is_err());
        assert!(!backend.is_recording());
    }
}
