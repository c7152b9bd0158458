//! capsync CLI: record screen sessions with synchronized cursor logs.
//!
//! Usage:
//!   capsync record [OPTIONS]           Record one display, window or area
//!   capsync record-windows [OPTIONS]   Record several windows on one timeline
//!   capsync list                       List displays and windows
//!   capsync analyze <CURSOR_LOG>       Summarize a cursor log

use std::path::PathBuf;

use capsync_common::config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "capsync",
    about = "Screen recording with synchronized cursor tracking",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a single session
    Record {
        /// Output video path
        #[arg(short, long, default_value = "recording.mov")]
        output: PathBuf,

        /// Display to record
        #[arg(long)]
        display: Option<u32>,

        /// Window to record
        #[arg(long)]
        window: Option<u32>,

        /// Display-relative area to record, as x,y,width,height
        #[arg(long, value_parser = commands::record::parse_area)]
        area: Option<capsync_platform_core::Rect>,

        /// Target FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Capture the microphone
        #[arg(long)]
        mic: bool,

        /// Capture system audio
        #[arg(long)]
        system_audio: bool,

        /// Capture the camera
        #[arg(long)]
        camera: bool,

        /// Do not write a cursor log
        #[arg(long)]
        no_cursor: bool,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,

        /// Run the session in a worker process
        #[arg(long)]
        worker: bool,
    },

    /// Record several windows on a shared timeline
    RecordWindows {
        /// Window ids, in layout order
        #[arg(long, value_delimiter = ',', required = true)]
        windows: Vec<u32>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Target FPS
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Capture the microphone (first window only)
        #[arg(long)]
        mic: bool,

        /// Capture system audio (first window only)
        #[arg(long)]
        system_audio: bool,

        /// Capture the camera (first window only)
        #[arg(long)]
        camera: bool,

        /// Do not write the global cursor log
        #[arg(long)]
        no_cursor: bool,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,

        /// Run every recorder in this process instead of one worker each
        #[arg(long)]
        in_process: bool,
    },

    /// List displays and windows
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Summarize a cursor log
    Analyze {
        /// Path to a cursor log (.jsonl or .json)
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Serve worker requests on stdin/stdout
    #[command(hide = true)]
    Worker,
}

impl Cli {
    /// Global flags a worker child needs to behave like this process.
    fn worker_forward_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.json_logs {
            args.push("--json-logs".to_string());
        }
        args
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    config.worker.forward_args = cli.worker_forward_args();
    capsync_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Record {
            output,
            display,
            window,
            area,
            fps,
            mic,
            system_audio,
            camera,
            no_cursor,
            duration,
            worker,
        } => {
            let mut options = capsync_capture_engine::RecordingOptions::from_defaults(&config.recording);
            options.display_id = display;
            options.window_id = window;
            options.capture_area = area;
            options.frame_rate = fps.unwrap_or(options.frame_rate);
            options.include_microphone |= mic;
            options.include_system_audio |= system_audio;
            options.capture_camera = camera;
            options.track_cursor = options.track_cursor && !no_cursor;
            commands::record::run(&config, output, options, duration, worker).await
        }
        Commands::RecordWindows {
            windows,
            output,
            fps,
            mic,
            system_audio,
            camera,
            no_cursor,
            duration,
            in_process,
        } => {
            let options = capsync_capture_engine::MultiWindowOptions {
                frame_rate: fps,
                quality: config.recording.quality.clone(),
                capture_cursor: config.recording.capture_cursor,
                enable_microphone: mic,
                capture_system_audio: system_audio,
                enable_camera: camera,
                track_cursor: !no_cursor,
                ..Default::default()
            };
            commands::record_windows::run(&config, windows, output, options, duration, in_process)
                .await
        }
        Commands::List { json } => commands::list::run(json),
        Commands::Analyze { path, json } => commands::analyze::run(path, json),
        Commands::Worker => commands::worker::run(&config).await,
    }
}
