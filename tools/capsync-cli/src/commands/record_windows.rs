//! Record several windows on one shared timeline.

use std::path::PathBuf;
use std::sync::Arc;

use capsync_capture_engine::{
    default_backend, BackendPointer, LocalRecorderFactory, MultiWindowEvent, MultiWindowOptions,
    MultiWindowRecorder, RecorderFactory, SimulatedBackend,
};
use capsync_common::config::AppConfig;
use capsync_platform_core::{NativeBackend, PointerSource};
use capsync_worker::WorkerRecorderFactory;

pub async fn run(
    config: &AppConfig,
    window_ids: Vec<u32>,
    output: PathBuf,
    options: MultiWindowOptions,
    duration: Option<u64>,
    in_process: bool,
) -> anyhow::Result<()> {
    let backend = default_backend();
    let available = backend.windows()?;

    let mut windows = Vec::with_capacity(window_ids.len());
    for id in &window_ids {
        match available.iter().find(|w| w.id == *id) {
            Some(window) => windows.push(window.clone()),
            None => anyhow::bail!("window {id} not found (see `capsync list`)"),
        }
    }

    let factory: Arc<dyn RecorderFactory> = if in_process {
        // One native session per backend, so each window needs its own.
        Arc::new(LocalRecorderFactory::per_recorder(
            || Arc::new(SimulatedBackend::new()) as Arc<dyn NativeBackend>,
            config.cursor.clone(),
        ))
    } else {
        Arc::new(WorkerRecorderFactory::new(config.worker.clone()))
    };
    let pointer: Arc<dyn PointerSource> = Arc::new(BackendPointer(backend));

    let mut recorder = MultiWindowRecorder::new(
        factory,
        pointer,
        config.cursor.clone(),
        config.multi_window.clone(),
        options,
    );
    for window in windows {
        recorder.add_window(window).await?;
    }

    let mut events = recorder.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                MultiWindowEvent::RecorderStarted {
                    index, window, output_path, ..
                } => println!(
                    "  [{index}] {} -> {}",
                    window.app_name,
                    output_path.display()
                ),
                MultiWindowEvent::RecorderError { index, error } => {
                    eprintln!("  [{index}] error: {error}")
                }
                MultiWindowEvent::AllStopped(_) => break,
                _ => {}
            }
        }
    });

    println!(
        "Starting {} window recorder(s) into {}",
        recorder.window_count(),
        output.display()
    );
    let started = match recorder.start_recording(&output, None).await {
        Ok(started) => started,
        Err(e) => {
            recorder.destroy().await;
            reporter.abort();
            return Err(e.into());
        }
    };
    if let Some(cursor) = &started.cursor_file {
        println!("  Cursor: {}", cursor.display());
    }

    super::wait_for_stop(duration).await?;

    let stopped = recorder.stop_recording().await;
    recorder.destroy().await;
    if stopped.is_err() {
        reporter.abort();
    }
    let _ = reporter.await;
    let stopped = stopped?;

    let metadata_path = output.join("session.json");
    stopped.metadata.save(&metadata_path)?;
    for index in stopped.metadata.inconsistent_windows() {
        tracing::warn!(index, "Window sync offset does not match its timestamps");
    }

    println!("{}", serde_json::to_string_pretty(&stopped)?);
    println!("Metadata saved to: {}", metadata_path.display());
    if !stopped.success {
        anyhow::bail!("one or more windows failed to stop cleanly");
    }
    Ok(())
}
