use std::sync::{Arc, Mutex};
use std::time::Duration;

use capsync_capture_engine::backend::{SimulatedBackend, StartFailure};
use capsync_capture_engine::{
    LocalRecorderFactory, MultiWindowEvent, MultiWindowOptions, MultiWindowRecorder,
};
use capsync_common::config::{CursorConfig, MultiWindowConfig};
use capsync_common::error::CapsyncError;
use capsync_input_tracker::backends::ScriptedPointerSource;
use capsync_platform_core::{NativeBackend, PointerEventType, PointerSample, WindowInfo};
use capsync_project_model::event::{parse_cursor_log, RecordingType};

type Spawned = Arc<Mutex<Vec<Arc<SimulatedBackend>>>>;

fn window(id: u32, app_name: &str, x: f64) -> WindowInfo {
    WindowInfo {
        id,
        app_name: app_name.to_string(),
        title: format!("{app_name} window"),
        x,
        y: 100.0,
        width: 400.0,
        height: 300.0,
    }
}

fn recorder(options: MultiWindowOptions) -> (MultiWindowRecorder, Spawned) {
    let spawned: Spawned = Arc::default();
    let tracked = spawned.clone();
    let factory = LocalRecorderFactory::per_recorder(
        move || {
            let backend = Arc::new(SimulatedBackend::new());
            if let Ok(mut list) = tracked.lock() {
                list.push(backend.clone());
            }
            backend as Arc<dyn NativeBackend>
        },
        CursorConfig::default(),
    );

    let pointer = Arc::new(ScriptedPointerSource::new(vec![
        Some(PointerSample::new(50.0, 150.0)),
        Some(PointerSample::new(650.0, 150.0).with_event_type(PointerEventType::MouseDown)),
    ]));

    let recorder = MultiWindowRecorder::new(
        Arc::new(factory),
        pointer,
        CursorConfig::default(),
        MultiWindowConfig::default(),
        options,
    );
    (recorder, spawned)
}

#[tokio::test(start_paused = true)]
async fn two_windows_record_under_one_start_time() {
    let dir = tempfile::tempdir().unwrap();
    let (mut recorder, spawned) = recorder(MultiWindowOptions {
        enable_microphone: true,
        ..Default::default()
    });
    let mut events = recorder.subscribe();

    assert_eq!(recorder.add_window(window(11, "Text Edit", 0.0)).await.unwrap(), 0);
    assert_eq!(recorder.add_window(window(12, "Browser", 600.0)).await.unwrap(), 1);
    assert_eq!(recorder.window_count(), 2);

    let start = recorder.start_recording(dir.path(), None).await.unwrap();
    assert_eq!(start.window_count, 2);
    assert_eq!(start.output_files.len(), 2);
    assert!(start.output_files[0]
        .to_string_lossy()
        .ends_with(&format!("temp_window_0_Text_Edit_{}.mov", start.start_time)));
    assert!(recorder.is_recording());

    let backends = spawned.lock().unwrap().clone();
    assert!(backends.iter().all(|b| b.is_recording()));
    let first = backends[0].last_options().unwrap();
    let second = backends[1].last_options().unwrap();
    assert!(first.include_microphone);
    assert!(!second.include_microphone);
    assert_eq!(first.session_timestamp, start.start_time);
    assert_eq!(second.session_timestamp, start.start_time);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stop = recorder.stop_recording().await.unwrap();

    assert!(stop.success);
    assert_eq!(stop.metadata.windows.len(), 2);
    assert!(stop.metadata.inconsistent_windows().is_empty());
    for entry in &stop.metadata.windows {
        assert_eq!(entry.sync_offset, entry.sync_timestamp - stop.metadata.timestamp);
        assert_eq!(entry.cursor_file_path, start.cursor_file);
    }
    assert!(stop.metadata.windows[1].sync_offset >= 1_000);
    assert!(stop.audio_file.is_some());
    assert!(backends.iter().all(|b| !b.is_recording()));
    assert!(!recorder.is_recording());

    let cursor = std::fs::read_to_string(start.cursor_file.clone().unwrap()).unwrap();
    let log = parse_cursor_log(&cursor).unwrap();
    assert_eq!(log.events.len(), 2);
    assert!(log.events.iter().all(|e| e.recording_type == RecordingType::MultiWindow));
    assert_eq!(log.events[0].location.unwrap().hover, Some(11));
    assert_eq!(log.events[1].location.unwrap().click, Some(12));

    let mut started = 0;
    loop {
        match events.recv().await.unwrap() {
            MultiWindowEvent::RecorderStarted { .. } => started += 1,
            MultiWindowEvent::AllStarted(info) => {
                assert_eq!(started, 2);
                assert_eq!(info, start);
            }
            MultiWindowEvent::AllStopped(result) => {
                assert_eq!(result, stop);
                break;
            }
            _ => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failed_window_stops_the_ones_already_started() {
    let dir = tempfile::tempdir().unwrap();
    let (mut recorder, spawned) = recorder(MultiWindowOptions {
        enable_microphone: true,
        enable_camera: true,
        ..Default::default()
    });

    recorder.add_window(window(11, "A", 0.0)).await.unwrap();
    recorder.add_window(window(12, "B", 600.0)).await.unwrap();
    recorder.add_window(window(13, "C", 1200.0)).await.unwrap();

    let backends = spawned.lock().unwrap().clone();
    backends[2].fail_next_start(StartFailure::Error);

    let err = recorder.start_recording(dir.path(), None).await.unwrap_err();
    assert!(matches!(err, CapsyncError::BackendStartFailed { .. }));
    assert!(err.to_string().contains("recorder 3"));

    assert!(backends.iter().all(|b| !b.is_recording()));
    assert!(!recorder.is_recording());

    let status = recorder.status();
    assert!(status.output_files.is_empty());
    assert_eq!(status.cursor_file, None);
    assert_eq!(status.camera_file, None);
    assert_eq!(status.audio_file, None);
    assert!(status.windows.iter().all(|w| w.output_path.is_none()));
    assert_eq!(recorder.metadata(), None);

    assert!(matches!(
        recorder.stop_recording().await,
        Err(CapsyncError::NotRecording { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn shared_backend_slot_rejects_second_window() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SimulatedBackend::new());
    let factory = LocalRecorderFactory::shared(backend.clone(), CursorConfig::default());
    let mut recorder = MultiWindowRecorder::new(
        Arc::new(factory),
        backend.clone(),
        CursorConfig::default(),
        MultiWindowConfig::default(),
        MultiWindowOptions::default(),
    );

    recorder.add_window(window(11, "A", 0.0)).await.unwrap();
    recorder.add_window(window(12, "B", 600.0)).await.unwrap();

    assert!(recorder.start_recording(dir.path(), None).await.is_err());
    assert!(!backend.is_recording());
    assert_eq!(backend.start_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn window_list_is_frozen_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let (mut recorder, _) = recorder(MultiWindowOptions {
        track_cursor: false,
        ..Default::default()
    });

    assert!(matches!(
        recorder.start_recording(dir.path(), None).await,
        Err(CapsyncError::InvalidArgument { .. })
    ));

    recorder.add_window(window(11, "A", 0.0)).await.unwrap();
    recorder.add_window(window(12, "B", 600.0)).await.unwrap();
    recorder.remove_window(0).await.unwrap();
    assert_eq!(recorder.status().windows[0].window.id, 12);
    assert!(recorder.remove_window(5).await.is_err());

    let start = recorder.start_recording(dir.path(), None).await.unwrap();
    assert!(start.cursor_file.is_none());
    assert!(matches!(
        recorder.add_window(window(13, "C", 0.0)).await,
        Err(CapsyncError::AlreadyInProgress)
    ));
    assert!(matches!(
        recorder.start_recording(dir.path(), None).await,
        Err(CapsyncError::AlreadyInProgress)
    ));
    assert!(recorder.metadata().is_some());

    recorder.destroy().await;
    assert_eq!(recorder.window_count(), 0);
    assert!(!recorder.is_recording());
    assert_eq!(recorder.metadata().unwrap().windows.len(), 1);
}
