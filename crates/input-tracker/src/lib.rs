//! capsync input tracker
//!
//! Samples the pointer on a fixed cadence, converts each raw global sample
//! into the recording's coordinate space, drops near-duplicates, and
//! appends what is left to a cursor log file.
//!
//! The log is best-effort telemetry: a failed read skips one tick and the
//! sampler keeps going.

pub mod backends;
pub mod transform;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use capsync_common::clock::SessionClock;
use capsync_common::config::CursorConfig;
use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_platform_core::{PointerSource, WindowInfo};
use capsync_project_model::event::{CursorEvent, CursorLogHeader, RecordingType};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::transform::{
    locate, transform, window_relative, DisplayContext, Point, RecordingModeContext,
};
use crate::writer::EventWriter;

/// Everything the sampler needs to know about the recording it serves.
#[derive(Debug, Clone, Default)]
pub struct SamplingContext {
    pub display: Option<DisplayContext>,
    pub mode: Option<RecordingModeContext>,
    /// Windows to classify hover/click against, front-to-back.
    pub windows: Vec<WindowInfo>,
    pub recording_type: RecordingType,
}

impl SamplingContext {
    /// Context for a single display, window or area recording.
    pub fn for_recording(
        display: Option<DisplayContext>,
        mode: Option<RecordingModeContext>,
    ) -> Self {
        Self {
            display,
            mode,
            windows: Vec::new(),
            recording_type: mode.map(|m| m.recording_type()).unwrap_or_default(),
        }
    }

    /// Desktop-wide context: raw global coordinates, annotated with the
    /// window under the pointer.
    pub fn global(windows: Vec<WindowInfo>) -> Self {
        Self {
            display: None,
            mode: None,
            windows,
            recording_type: RecordingType::MultiWindow,
        }
    }

    fn header(&self, clock: &SessionClock, interval: Duration) -> CursorLogHeader {
        CursorLogHeader {
            schema_version: "1.0".to_string(),
            session_timestamp: clock.session_timestamp_ms(),
            epoch_wall: clock.epoch_wall(),
            recording_type: self.recording_type,
            display_origin: self.display.map(|d| (d.origin_x, d.origin_y)),
            video_frame: self.mode.map(|m| m.video_frame()),
            sample_interval_ms: interval.as_millis() as u64,
        }
    }
}

/// Decide whether a sample differs enough from the last kept one.
///
/// Kept when there is no previous sample, the event type or cursor glyph
/// changed, or the pointer moved at least `threshold_px` on either axis.
pub fn should_capture(current: &CursorEvent, last: Option<&CursorEvent>, threshold_px: f64) -> bool {
    let Some(last) = last else {
        return true;
    };

    current.event_type != last.event_type
        || (current.x - last.x).abs() >= threshold_px
        || (current.y - last.y).abs() >= threshold_px
        || current.cursor_type != last.cursor_type
}

/// Counters reported when a sampler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerStats {
    pub ticks: u64,
    pub events_written: u64,
    pub read_failures: u64,
    pub write_failures: u64,
}

/// The per-tick state of a running sampler.
struct SamplerLoop {
    source: Arc<dyn PointerSource>,
    context: SamplingContext,
    clock: SessionClock,
    writer: EventWriter,
    threshold_px: f64,
    last: Option<CursorEvent>,
    stats: SamplerStats,
}

impl SamplerLoop {
    fn read_event(&self) -> CapsyncResult<CursorEvent> {
        let sample = self.source.cursor_position()?;
        let raw = Point::new(sample.x, sample.y);
        let t = transform(raw, self.context.mode.as_ref(), self.context.display.as_ref());

        let (location, window_relative) = if self.context.windows.is_empty() {
            (None, None)
        } else {
            (
                Some(locate(raw, &self.context.windows, sample.event_type)),
                window_relative(raw, &self.context.windows),
            )
        };

        Ok(CursorEvent {
            x: t.x,
            y: t.y,
            timestamp_ms: self.clock.elapsed_ms(),
            unix_time_ms: self.clock.now_ms(),
            cursor_type: sample.cursor_type,
            event_type: sample.event_type,
            coordinate_system: t.coordinate_system,
            recording_type: self.context.recording_type,
            location,
            window_relative,
        })
    }

    fn tick(&mut self) {
        self.stats.ticks += 1;

        let event = match self.read_event() {
            Ok(event) => event,
            Err(e) => {
                self.stats.read_failures += 1;
                if self.stats.read_failures == 1 {
                    tracing::warn!(error = %e, "Cursor read failed, skipping sample");
                } else {
                    tracing::debug!(error = %e, failures = self.stats.read_failures, "Cursor read failed");
                }
                return;
            }
        };

        if !should_capture(&event, self.last.as_ref(), self.threshold_px) {
            return;
        }

        match self.writer.write_event(&event) {
            Ok(()) => {
                self.stats.events_written += 1;
                self.last = Some(event);
            }
            Err(e) => {
                self.stats.write_failures += 1;
                tracing::warn!(error = %e, "Failed to append cursor event");
            }
        }
    }

    async fn run(
        mut self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> CapsyncResult<SamplerStats> {
        tracing::info!(
            source = %self.source.name(),
            path = %self.writer.path().display(),
            interval_ms = interval.as_millis() as u64,
            "Cursor sampler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(),
            }
        }

        self.writer.finish()?;
        tracing::info!(
            events = self.stats.events_written,
            ticks = self.stats.ticks,
            read_failures = self.stats.read_failures,
            "Cursor sampler stopped"
        );
        Ok(self.stats)
    }
}

struct RunningSampler {
    cancel: CancellationToken,
    task: JoinHandle<CapsyncResult<SamplerStats>>,
    path: PathBuf,
}

/// Polls a pointer source and writes a change-triggered cursor log.
pub struct CursorSampler {
    source: Arc<dyn PointerSource>,
    config: CursorConfig,
    running: Option<RunningSampler>,
}

impl CursorSampler {
    pub fn new(source: Arc<dyn PointerSource>, config: CursorConfig) -> Self {
        Self {
            source,
            config,
            running: None,
        }
    }

    /// Open the log at `path` and start polling. Timestamps are relative to
    /// the clock's session timestamp.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &mut self,
        path: PathBuf,
        context: SamplingContext,
        clock: SessionClock,
    ) -> CapsyncResult<()> {
        if self.running.is_some() {
            return Err(CapsyncError::AlreadyInProgress);
        }

        let interval = self.config.sample_interval();
        let header = context.header(&clock, interval);
        let writer = EventWriter::new(
            path.clone(),
            &header,
            self.config.log_format,
            self.config.flush_every,
        )
        .map_err(|e| CapsyncError::cursor_capture(format!("cannot open {}: {e}", path.display())))?;

        let sampler = SamplerLoop {
            source: self.source.clone(),
            context,
            clock,
            writer,
            threshold_px: self.config.movement_threshold_px,
            last: None,
            stats: SamplerStats::default(),
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(sampler.run(interval, cancel.clone()));
        self.running = Some(RunningSampler { cancel, task, path });
        Ok(())
    }

    /// Stop polling and close the log.
    pub async fn stop(&mut self) -> CapsyncResult<SamplerStats> {
        let running = self
            .running
            .take()
            .ok_or_else(|| CapsyncError::not_recording("idle"))?;

        running.cancel.cancel();
        match running.task.await {
            Ok(result) => result,
            Err(e) => Err(CapsyncError::cursor_capture(format!(
                "sampler task failed: {e}"
            ))),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Path of the active log.
    pub fn path(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.path.as_path())
    }
}

impl Drop for CursorSampler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ScriptedPointerSource;
    use capsync_common::config::CursorLogFormat;
    use capsync_platform_core::{PointerEventType, PointerSample, Rect};
    use capsync_project_model::event::{parse_cursor_log, CoordinateSystem};

    fn event(x: f64, y: f64, cursor_type: &str, event_type: PointerEventType) -> CursorEvent {
        CursorEvent {
            x,
            y,
            timestamp_ms: 0,
            unix_time_ms: 0,
            cursor_type: cursor_type.to_string(),
            event_type,
            coordinate_system: CoordinateSystem::VideoRelative,
            recording_type: RecordingType::Display,
            location: None,
            window_relative: None,
        }
    }

    #[test]
    fn test_should_capture_thresholds() {
        let base = event(100.0, 100.0, "default", PointerEventType::Move);

        assert!(should_capture(&base, None, 2.0));
        assert!(!should_capture(&base.clone(), Some(&base), 2.0));

        let dx1 = event(101.0, 100.0, "default", PointerEventType::Move);
        assert!(!should_capture(&dx1, Some(&base), 2.0));
        let dx2 = event(102.0, 100.0, "default", PointerEventType::Move);
        assert!(should_capture(&dx2, Some(&base), 2.0));
        let dy_neg2 = event(100.0, 98.0, "default", PointerEventType::Move);
        assert!(should_capture(&dy_neg2, Some(&base), 2.0));

        let glyph = event(100.0, 100.0, "pointer", PointerEventType::Move);
        assert!(should_capture(&glyph, Some(&base), 2.0));
        let click = event(100.0, 100.0, "default", PointerEventType::MouseDown);
        assert!(should_capture(&click, Some(&base), 2.0));
    }

    fn config(format: CursorLogFormat) -> CursorConfig {
        CursorConfig {
            sample_interval_ms: 20,
            movement_threshold_px: 2.0,
            log_format: format,
            flush_every: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_writes_change_triggered_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_cursor_1.jsonl");

        let source = Arc::new(ScriptedPointerSource::new(vec![
            Some(PointerSample::new(15.0, 25.0)),
            Some(PointerSample::new(15.0, 25.0)),
            Some(PointerSample::new(16.0, 25.0)),
            None,
            Some(PointerSample::new(40.0, 25.0)),
            Some(PointerSample::new(40.0, 25.0).with_cursor_type("pointer")),
            Some(PointerSample::new(200.0, 25.0)),
        ]));

        let display = DisplayContext {
            display_id: Some(1),
            origin_x: 0.0,
            origin_y: 0.0,
            width: 1920.0,
            height: 1080.0,
        };
        let mode = RecordingModeContext::Window {
            window_id: 3,
            area: Rect::new(10.0, 20.0, 100.0, 50.0),
        };

        let mut sampler = CursorSampler::new(source.clone(), config(CursorLogFormat::Jsonl));
        sampler
            .start(
                path.clone(),
                SamplingContext::for_recording(Some(display), Some(mode)),
                SessionClock::start(),
            )
            .unwrap();
        assert!(sampler.is_running());
        assert!(sampler.start(path.clone(), SamplingContext::default(), SessionClock::start()).is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = sampler.stop().await.unwrap();
        assert!(!sampler.is_running());

        assert_eq!(stats.read_failures, 1);
        assert_eq!(stats.events_written, 4);
        assert!(stats.ticks >= 7);

        let log = parse_cursor_log(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(log.events.len(), 4);
        assert_eq!(log.header.unwrap().recording_type, RecordingType::Window);

        let first = &log.events[0];
        assert_eq!((first.x, first.y), (5.0, 5.0));
        assert_eq!(first.timestamp_ms, 0);
        assert_eq!(first.coordinate_system, CoordinateSystem::VideoRelative);

        assert_eq!(log.events[2].cursor_type, "pointer");
        assert_eq!(
            log.events[3].coordinate_system,
            CoordinateSystem::VideoRelativeOutside
        );

        let stamps: Vec<u64> = log.events.iter().map(|e| e.timestamp_ms).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_sampler_annotates_window_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_cursor_2.json");

        let source = Arc::new(ScriptedPointerSource::new(vec![
            Some(PointerSample::new(50.0, 50.0)),
            Some(PointerSample::new(50.0, 50.0).with_event_type(PointerEventType::MouseDown)),
        ]));
        let windows = vec![WindowInfo {
            id: 11,
            app_name: "Editor".to_string(),
            title: String::new(),
            x: 40.0,
            y: 40.0,
            width: 300.0,
            height: 200.0,
        }];

        let mut sampler = CursorSampler::new(source, config(CursorLogFormat::JsonArray));
        sampler
            .start(path.clone(), SamplingContext::global(windows), SessionClock::start())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        sampler.stop().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with(']'));
        let log = parse_cursor_log(&content).unwrap();
        assert!(log.clean_shutdown);
        assert_eq!(log.events.len(), 2);

        let click = &log.events[1];
        assert_eq!(click.coordinate_system, CoordinateSystem::Global);
        assert_eq!(click.recording_type, RecordingType::MultiWindow);
        assert_eq!(click.location.unwrap().click, Some(11));
        let rel = click.window_relative.unwrap();
        assert_eq!((rel.x, rel.y), (10.0, 10.0));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let source = Arc::new(ScriptedPointerSource::new(vec![]));
        let mut sampler = CursorSampler::new(source, CursorConfig::default());
        assert!(matches!(
            sampler.stop().await,
            Err(CapsyncError::NotRecording { .. })
        ));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_cursor_capture_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let source = Arc::new(ScriptedPointerSource::new(vec![]));
        let mut sampler = CursorSampler::new(source, CursorConfig::default());
        let err = sampler
            .start(
                blocker.join("cursor.jsonl"),
                SamplingContext::default(),
                SessionClock::start(),
            )
            .unwrap_err();
        assert!(matches!(err, CapsyncError::CursorCaptureFailed { .. }));
        assert!(!sampler.is_running());
    }
}
