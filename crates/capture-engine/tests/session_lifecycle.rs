use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use capsync_capture_engine::backend::{SimulatedBackend, StartFailure};
use capsync_capture_engine::paths::embedded_timestamps;
use capsync_capture_engine::{CaptureSession, RecordingOptions, SessionEvent, SessionState};
use capsync_common::config::CursorConfig;
use capsync_common::error::CapsyncError;
use capsync_platform_core::PointerSample;
use capsync_project_model::event::{parse_cursor_log, CoordinateSystem, RecordingType};

fn scripted_backend() -> Arc<SimulatedBackend> {
    Arc::new(
        SimulatedBackend::new()
            .with_confirm_delay(Duration::from_millis(100))
            .with_pointer_script(vec![
                Some(PointerSample::new(500.0, 400.0)),
                Some(PointerSample::new(520.0, 400.0)),
                Some(PointerSample::new(540.0, 410.0)),
            ]),
    )
}

fn session(backend: &Arc<SimulatedBackend>) -> CaptureSession {
    CaptureSession::new(backend.clone(), CursorConfig::default())
}

fn av_options() -> RecordingOptions {
    RecordingOptions {
        include_microphone: true,
        capture_camera: true,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_and_stop_requires_active() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);

    let err = session.stop().await.unwrap_err();
    assert!(matches!(err, CapsyncError::NotRecording { .. }));

    session
        .start(&dir.path().join("demo.mov"), RecordingOptions::default())
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let err = session
        .start(&dir.path().join("other.mov"), RecordingOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CapsyncError::AlreadyInProgress));
    assert_eq!(backend.start_calls(), 1);

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.stop().await,
        Err(CapsyncError::NotRecording { .. })
    ));

    // A stopped session can record again.
    session
        .start(&dir.path().join("again.mov"), RecordingOptions::default())
        .await
        .unwrap();
    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn every_output_path_shares_one_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);

    let result = session
        .start(&dir.path().join("demo.mov"), av_options())
        .await
        .unwrap();

    let paths = &result.output_paths;
    assert!(paths.camera.is_some() && paths.audio.is_some() && paths.cursor.is_some());

    let tokens: BTreeSet<u64> = paths
        .all()
        .into_iter()
        .flat_map(embedded_timestamps)
        .collect();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.into_iter().next(), Some(result.session_timestamp));

    let native = backend.last_options().unwrap();
    assert_eq!(native.session_timestamp, result.session_timestamp);
    assert_eq!(native.camera_output_path, paths.camera);

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn imposed_session_timestamp_is_used_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);
    let ts = capsync_common::clock::unix_time_ms() - 250;

    let result = session
        .start(
            &dir.path().join("demo.mov"),
            RecordingOptions {
                session_timestamp: Some(ts),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.session_timestamp, ts);
    assert_eq!(
        result.output_paths.screen,
        dir.path().join(format!("demo-{ts}.mov"))
    );
    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refused_start_rolls_back_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);

    backend.fail_next_start(StartFailure::Refuse);
    let err = session
        .start(&dir.path().join("demo.mov"), av_options())
        .await
        .unwrap_err();
    assert!(matches!(err, CapsyncError::BackendStartFailed { .. }));
    assert_eq!(session.state(), SessionState::Idle);

    backend.fail_next_start(StartFailure::Error);
    let err = session
        .start(&dir.path().join("demo.mov"), av_options())
        .await
        .unwrap_err();
    assert!(matches!(err, CapsyncError::BackendStartFailed { .. }));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("temp_"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert!(!backend.is_recording());

    session
        .start(&dir.path().join("demo.mov"), av_options())
        .await
        .unwrap();
    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cursor_stops_before_backend_and_log_is_complete() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);

    let result = session
        .start(&dir.path().join("demo.mov"), RecordingOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stop = session.stop().await.unwrap();
    assert!(stop.success);
    assert_eq!(stop.code, 0);
    assert_eq!(backend.idle_pointer_reads(), 0);

    let cursor = stop.cursor.unwrap();
    assert_eq!(cursor.events_written, 3);
    assert_eq!(cursor.read_failures, 0);

    let cursor_path = result.output_paths.cursor.unwrap();
    let log = parse_cursor_log(&std::fs::read_to_string(cursor_path).unwrap()).unwrap();
    assert_eq!(log.events.len(), 3);
    assert_eq!(
        log.header.unwrap().session_timestamp,
        result.session_timestamp
    );
    let first = &log.events[0];
    assert_eq!(first.recording_type, RecordingType::Display);
    assert_eq!(first.coordinate_system, CoordinateSystem::VideoRelative);
    assert_eq!((first.x, first.y), (500.0, 400.0));
    assert!(log
        .events
        .windows(2)
        .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
}

#[tokio::test(start_paused = true)]
async fn window_recording_transforms_into_window_space() {
    let dir = tempfile::tempdir().unwrap();
    // Terminal window sits at (100,100) on the primary display.
    let backend = Arc::new(
        SimulatedBackend::new().with_pointer_script(vec![Some(PointerSample::new(115.0, 125.0))]),
    );
    let mut session = session(&backend);

    let result = session
        .start(
            &dir.path().join("win.mov"),
            RecordingOptions {
                window_id: Some(101),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.display_id, Some(1));
    assert_eq!(result.window_id, Some(101));

    tokio::time::sleep(Duration::from_millis(50)).await;
    session.stop().await.unwrap();

    let content = std::fs::read_to_string(result.output_paths.cursor.unwrap()).unwrap();
    let event = &parse_cursor_log(&content).unwrap().events[0];
    assert_eq!((event.x, event.y), (15.0, 25.0));
    assert_eq!(event.recording_type, RecordingType::Window);
}

#[tokio::test(start_paused = true)]
async fn cursor_failure_does_not_abort_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);
    let ts = capsync_common::clock::unix_time_ms();

    // A directory squatting on the cursor log path makes the log unopenable.
    std::fs::create_dir_all(dir.path().join(format!("temp_cursor_{ts}.jsonl"))).unwrap();

    let result = session
        .start(
            &dir.path().join("demo.mov"),
            RecordingOptions {
                session_timestamp: Some(ts),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!result.cursor_tracking);
    assert!(result.output_paths.cursor.is_none());
    assert_eq!(session.state(), SessionState::Active);

    let stop = session.stop().await.unwrap();
    assert!(stop.success);
    assert!(stop.cursor.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_native_stop_still_ends_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);

    session
        .start(&dir.path().join("demo.mov"), RecordingOptions::default())
        .await
        .unwrap();
    backend.fail_next_stop();

    let stop = session.stop().await.unwrap();
    assert!(!stop.success);
    assert_eq!(stop.code, 1);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = scripted_backend();
    let mut session = session(&backend);
    let mut events = session.subscribe();

    session
        .start(&dir.path().join("demo.mov"), av_options())
        .await
        .unwrap();

    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Started(_)));
    match events.recv().await.unwrap() {
        SessionEvent::RecordingStarted(started) => {
            assert!(started.confirmed);
            assert!(started.waited_ms >= 100);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(session.status().backend_confirmed);
    assert!(session.status().is_recording);

    assert!(matches!(events.recv().await.unwrap(), SessionEvent::TimeUpdate(_)));

    let stop = session.stop().await.unwrap();
    match events.recv().await.unwrap() {
        SessionEvent::Stopped(result) => assert_eq!(result, stop),
        other => panic!("unexpected event {other:?}"),
    }
    match events.recv().await.unwrap() {
        SessionEvent::Completed(path) => assert_eq!(path, stop.output_paths.screen),
        other => panic!("unexpected event {other:?}"),
    }

    let status = session.status();
    assert_eq!(status.state, SessionState::Stopped);
    assert!(!status.is_recording);
    assert_eq!(status.output_paths, Some(stop.output_paths.clone()));
    assert!(Path::new(&stop.output_paths.camera.unwrap()).exists());
}
