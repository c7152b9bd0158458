//! Session metadata consumed by downstream project-file writers.
//!
//! One document describes a multi-window recording: every window's output
//! file, the shared cursor log, and how far each window's start lagged
//! behind the shared start time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Current metadata schema version.
pub const METADATA_VERSION: &str = "2.0";

/// Top-level session metadata document (`session.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub version: String,

    /// Shared start time / session timestamp (ms since Unix epoch).
    pub timestamp: u64,

    /// Recording duration in milliseconds.
    pub duration: u64,

    pub windows: Vec<WindowEntry>,

    pub options: MetadataOptions,
}

/// One recorded window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowEntry {
    pub index: usize,
    pub window_id: u32,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub title: String,
    pub output_path: Option<PathBuf>,
    pub cursor_file_path: Option<PathBuf>,
    /// When this window's recorder was started (ms since Unix epoch).
    pub sync_timestamp: u64,
    /// `sync_timestamp - timestamp`; never negative.
    pub sync_offset: u64,
    /// Row used when laying windows out in an editor timeline.
    #[serde(default)]
    pub layout_row: usize,
}

/// Recording options echoed into the metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOptions {
    pub enable_camera: bool,
    pub camera_device_id: Option<String>,
    pub enable_microphone: bool,
    pub microphone_device_id: Option<String>,
    pub capture_system_audio: bool,
    pub track_cursor: bool,
}

/// Errors raised while reading or writing metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to access metadata at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metadata: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionMetadata {
    /// Write the document as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MetadataError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every window whose offset is inconsistent with its sync timestamp.
    pub fn inconsistent_windows(&self) -> Vec<usize> {
        self.windows
            .iter()
            .filter(|w| {
                w.sync_timestamp < self.timestamp
                    || w.sync_offset != w.sync_timestamp - self.timestamp
            })
            .map(|w| w.index)
            .collect()
    }
}
