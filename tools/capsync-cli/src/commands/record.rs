//! Record a single session.

use std::path::PathBuf;

use capsync_capture_engine::{default_backend, LocalRecorder, Recorder, RecordingOptions};
use capsync_common::config::AppConfig;
use capsync_platform_core::Rect;
use capsync_worker::WorkerRecorder;

/// Parse `x,y,width,height`.
pub fn parse_area(s: &str) -> Result<Rect, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid area {s:?}: {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err(format!("area {s:?} must have a positive size")),
        _ => Err(format!("area {s:?} must be x,y,width,height")),
    }
}

pub async fn run(
    config: &AppConfig,
    output: PathBuf,
    options: RecordingOptions,
    duration: Option<u64>,
    use_worker: bool,
) -> anyhow::Result<()> {
    let mut recorder: Box<dyn Recorder> = if use_worker {
        Box::new(WorkerRecorder::spawn(&config.worker).await?)
    } else {
        Box::new(LocalRecorder::new(default_backend(), config.cursor.clone()))
    };

    println!("Starting recording ({})", recorder.label());
    println!("  Output: {}", output.display());
    println!("  FPS: {}", options.frame_rate);
    println!("  Mic: {}", options.include_microphone);
    println!("  System audio: {}", options.include_system_audio);
    println!("  Camera: {}", options.capture_camera);
    println!("  Cursor log: {}", options.track_cursor);
    println!();

    let started = match recorder.start(&output, options).await {
        Ok(started) => started,
        Err(e) => {
            let _ = recorder.shutdown().await;
            return Err(e.into());
        }
    };
    println!("Session timestamp: {}", started.session_timestamp);
    println!("  Screen: {}", started.output_paths.screen.display());
    if let Some(cursor) = &started.output_paths.cursor {
        println!("  Cursor: {}", cursor.display());
    }

    super::wait_for_stop(duration).await?;

    let stopped = recorder.stop().await;
    recorder.shutdown().await?;
    let stopped = stopped?;

    println!("{}", serde_json::to_string_pretty(&stopped)?);
    if !stopped.success {
        anyhow::bail!("backend reported a failed stop");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_area() {
        assert_eq!(
            parse_area("10, 20,640,480").unwrap(),
            Rect::new(10.0, 20.0, 640.0, 480.0)
        );
        assert!(parse_area("10,20,0,480").is_err());
        assert!(parse_area("10,20,640").is_err());
        assert!(parse_area("a,b,c,d").is_err());
    }
}
