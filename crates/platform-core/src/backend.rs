//! Contract for the native capture backend.
//!
//! The backend owns enumeration, encoding and muxing. capsync only ever
//! asks it to start, stop, report status and report the pointer. One
//! backend instance has a single recording slot.

use std::path::PathBuf;

use capsync_common::error::CapsyncResult;
use serde::{Deserialize, Serialize};

use crate::geometry::{DisplayInfo, Rect, WindowInfo};

/// Last input event observed by the backend's pointer monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerEventType {
    #[default]
    Move,
    MouseDown,
    MouseUp,
    RightMouseDown,
    RightMouseUp,
    Drag,
    RightDrag,
    Scroll,
    #[serde(other)]
    Other,
}

impl PointerEventType {
    /// Press or release of any button.
    pub fn is_click(self) -> bool {
        matches!(
            self,
            Self::MouseDown | Self::MouseUp | Self::RightMouseDown | Self::RightMouseUp
        )
    }
}

/// A raw pointer reading in global desktop coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    /// Cursor glyph name (`default`, `pointer`, `text`, ...).
    pub cursor_type: String,
    pub event_type: PointerEventType,
}

impl PointerSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            cursor_type: "default".to_string(),
            event_type: PointerEventType::Move,
        }
    }

    pub fn with_cursor_type(mut self, cursor_type: impl Into<String>) -> Self {
        self.cursor_type = cursor_type.into();
        self
    }

    pub fn with_event_type(mut self, event_type: PointerEventType) -> Self {
        self.event_type = event_type;
        self
    }
}

/// Status reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub is_recording: bool,
    pub output_path: Option<PathBuf>,
    /// Authoritative camera file, which may differ from the requested one.
    pub camera_output_path: Option<PathBuf>,
    /// Authoritative audio file, which may differ from the requested one.
    pub audio_output_path: Option<PathBuf>,
}

/// Options handed to a single native start call. Screen, audio and camera
/// are started together by that one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRecordingOptions {
    pub display_id: Option<u32>,
    pub window_id: Option<u32>,
    /// Display-relative capture rectangle.
    pub capture_area: Option<Rect>,
    pub include_microphone: bool,
    pub include_system_audio: bool,
    pub capture_camera: bool,
    pub camera_device_id: Option<String>,
    pub audio_device_id: Option<String>,
    pub system_audio_device_id: Option<String>,
    pub capture_cursor: bool,
    pub frame_rate: u32,
    pub quality: String,
    pub session_timestamp: u64,
    pub camera_output_path: Option<PathBuf>,
    pub audio_output_path: Option<PathBuf>,
}

/// Something that can report the pointer position.
pub trait PointerSource: Send + Sync {
    /// Read the current pointer position, glyph and last event type.
    fn cursor_position(&self) -> CapsyncResult<PointerSample>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// The opaque native capture backend.
pub trait NativeBackend: PointerSource {
    fn displays(&self) -> CapsyncResult<Vec<DisplayInfo>>;

    fn windows(&self) -> CapsyncResult<Vec<WindowInfo>>;

    /// Start screen (+ audio + camera) capture. `Ok(false)` means the
    /// backend refused without raising an error.
    fn start_recording(
        &self,
        screen_path: &std::path::Path,
        options: &NativeRecordingOptions,
    ) -> CapsyncResult<bool>;

    fn stop_recording(&self) -> CapsyncResult<bool>;

    fn recording_status(&self) -> CapsyncResult<BackendStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names_are_lowercase() {
        let json = serde_json::to_string(&PointerEventType::RightMouseDown).unwrap();
        assert_eq!(json, "\"rightmousedown\"");

        let parsed: PointerEventType = serde_json::from_str("\"mouseup\"").unwrap();
        assert_eq!(parsed, PointerEventType::MouseUp);
    }

    #[test]
    fn unknown_event_type_maps_to_other() {
        let parsed: PointerEventType = serde_json::from_str("\"otherMouseDown\"").unwrap();
        assert_eq!(parsed, PointerEventType::Other);
        assert!(!parsed.is_click());
        assert!(PointerEventType::RightMouseUp.is_click());
    }
}
