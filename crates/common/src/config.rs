//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest cursor sampling interval the sampler will accept.
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 10;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Cursor sampler settings.
    pub cursor: CursorConfig,

    /// Worker process settings.
    pub worker: WorkerConfig,

    /// Multi-window sequencing settings.
    pub multi_window: MultiWindowConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Default frame rate.
    pub frame_rate: u32,

    /// Encoder quality preset passed through to the backend.
    pub quality: String,

    pub include_microphone: bool,

    pub include_system_audio: bool,

    /// Whether the backend should render the system cursor into the video.
    pub capture_cursor: bool,

    /// Whether to run the cursor sampler alongside the recording.
    pub track_cursor: bool,
}

/// On-disk format of the cursor event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorLogFormat {
    /// One JSON object per line; a crash leaves a parsable prefix.
    #[default]
    Jsonl,
    /// A single JSON array closed on stop.
    JsonArray,
}

impl CursorLogFormat {
    /// File extension used for logs in this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::JsonArray => "json",
        }
    }
}

/// Cursor sampler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Poll interval in milliseconds (clamped to at least 10ms).
    pub sample_interval_ms: u64,

    /// Minimum movement on either axis before a new sample is kept.
    pub movement_threshold_px: f64,

    pub log_format: CursorLogFormat,

    /// Flush the log after this many written events.
    pub flush_every: u64,
}

/// Worker process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Default per-request timeout.
    pub request_timeout_ms: u64,

    /// Timeout for `startRecording`; backend init can take seconds.
    pub start_timeout_ms: u64,

    pub stop_timeout_ms: u64,

    /// How long to wait for the child's `ready` message after spawn.
    pub ready_timeout_ms: u64,

    /// Program to launch as the worker. Defaults to the current executable.
    pub program: Option<PathBuf>,

    /// Arguments passed to the worker ahead of the `worker` subcommand,
    /// filled in at runtime from the parent's own flags.
    #[serde(skip)]
    pub forward_args: Vec<String>,
}

/// Multi-window sequencing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiWindowConfig {
    /// Settling delay between consecutive window starts.
    pub settle_delay_ms: u64,

    /// Settling delay after the last window starts.
    pub final_settle_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "capsync=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            quality: "high".to_string(),
            include_microphone: false,
            include_system_audio: false,
            capture_cursor: false,
            track_cursor: true,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 20,
            movement_threshold_px: 2.0,
            log_format: CursorLogFormat::default(),
            flush_every: 50,
        }
    }
}

impl CursorConfig {
    /// Effective poll interval after clamping.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(MIN_SAMPLE_INTERVAL_MS))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            start_timeout_ms: 60_000,
            stop_timeout_ms: 10_000,
            ready_timeout_ms: 10_000,
            program: None,
            forward_args: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl Default for MultiWindowConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1_000,
            final_settle_delay_ms: 200,
        }
    }
}

impl MultiWindowConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn final_settle_delay(&self) -> Duration {
        Duration::from_millis(self.final_settle_delay_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("capsync").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_missing_sections_with_defaults() {
        let raw = r#"{ "cursor": { "sample_interval_ms": 5 }, "worker": { "start_timeout_ms": 1000 } }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.cursor.sample_interval(), Duration::from_millis(10));
        assert_eq!(config.cursor.movement_threshold_px, 2.0);
        assert_eq!(config.worker.start_timeout(), Duration::from_millis(1000));
        assert_eq!(config.worker.request_timeout_ms, 30_000);
        assert_eq!(config.multi_window.settle_delay_ms, 1_000);
        assert!(config.recording.track_cursor);
    }

    #[test]
    fn log_format_uses_kebab_case_and_extension() {
        let format: CursorLogFormat = serde_json::from_str("\"json-array\"").unwrap();
        assert_eq!(format, CursorLogFormat::JsonArray);
        assert_eq!(format.extension(), "json");
        assert_eq!(CursorLogFormat::Jsonl.extension(), "jsonl");
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = tempfile_dir();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.logging.level, "info");
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("capsync_config_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
