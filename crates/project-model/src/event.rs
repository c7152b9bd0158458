//! Cursor event types for the capsync cursor log.
//!
//! The cursor log is a lossy, change-triggered trace: a sample is only
//! written when it differs meaningfully from the previous one. Timestamps
//! are milliseconds relative to the session timestamp and never decrease.
//!
//! Two on-disk formats are understood:
//! - JSONL: an optional `# {header}` line followed by one event per line.
//!   A crash leaves every completed line readable.
//! - JSON array: `[` + comma-separated events + `]`. A crash leaves the
//!   closing bracket missing; [`parse_cursor_log`] repairs that and reports
//!   the log as not cleanly shut down.

use capsync_common::config::CursorLogFormat;
use capsync_platform_core::{PointerEventType, Rect};
use serde::{Deserialize, Serialize};

/// Milliseconds since the session timestamp.
pub type TimestampMs = u64;

/// Coordinate space a recorded position is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinateSystem {
    /// Raw global desktop coordinates (no display could be resolved).
    Global,
    /// Display origin subtracted, inside the display.
    DisplayRelative,
    /// Display origin subtracted, outside the display.
    DisplayRelativeOutside,
    /// Relative to the captured video frame, inside it.
    VideoRelative,
    /// Relative to the captured video frame, outside it.
    VideoRelativeOutside,
}

impl CoordinateSystem {
    /// Whether the sample fell outside the reference frame.
    pub fn is_outside(self) -> bool {
        matches!(self, Self::DisplayRelativeOutside | Self::VideoRelativeOutside)
    }

    /// The `-outside` variant of this system. `Global` has none.
    pub fn outside(self) -> Self {
        match self {
            Self::DisplayRelative => Self::DisplayRelativeOutside,
            Self::VideoRelative => Self::VideoRelativeOutside,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::DisplayRelative => "display-relative",
            Self::DisplayRelativeOutside => "display-relative-outside",
            Self::VideoRelative => "video-relative",
            Self::VideoRelativeOutside => "video-relative-outside",
        }
    }
}

impl std::fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recording mode the cursor was sampled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingType {
    #[default]
    Display,
    Window,
    Area,
    /// Desktop-wide tracking shared by several window recordings.
    MultiWindow,
}

/// Which window the pointer hovered or clicked, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorLocation {
    pub hover: Option<u32>,
    pub click: Option<u32>,
}

/// Pointer position relative to the top-left corner of the hovered window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRelative {
    pub window_id: u32,
    pub x: f64,
    pub y: f64,
}

/// A single recorded cursor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEvent {
    pub x: f64,
    pub y: f64,

    /// Milliseconds since the session timestamp.
    pub timestamp_ms: TimestampMs,

    /// Wall-clock milliseconds since the Unix epoch.
    pub unix_time_ms: u64,

    pub cursor_type: String,

    pub event_type: PointerEventType,

    pub coordinate_system: CoordinateSystem,

    pub recording_type: RecordingType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CursorLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_relative: Option<WindowRelative>,
}

impl CursorEvent {
    /// Timestamp as fractional seconds since the session timestamp.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }
}

/// Header written at the top of a JSONL cursor log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorLogHeader {
    /// Schema version for forward compatibility.
    pub schema_version: String,

    /// Session timestamp every event is relative to.
    pub session_timestamp: u64,

    /// Wall-clock time at the session timestamp (RFC 3339).
    pub epoch_wall: String,

    pub recording_type: RecordingType,

    /// Origin that was subtracted from raw samples, if any.
    #[serde(default)]
    pub display_origin: Option<(f64, f64)>,

    /// Display-relative video frame, if any.
    #[serde(default)]
    pub video_frame: Option<Rect>,

    pub sample_interval_ms: u64,
}

/// A parsed cursor log.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorLog {
    pub format: CursorLogFormat,
    pub header: Option<CursorLogHeader>,
    pub events: Vec<CursorEvent>,
    /// False when the log ends mid-write (missing `]` or torn last line).
    pub clean_shutdown: bool,
}

/// Parse a cursor log in either supported format.
pub fn parse_cursor_log(content: &str) -> Result<CursorLog, serde_json::Error> {
    if content.trim_start().starts_with('[') {
        parse_array_log(content.trim())
    } else {
        parse_jsonl_log(content)
    }
}

fn parse_jsonl_log(content: &str) -> Result<CursorLog, serde_json::Error> {
    let mut header = None;
    let mut events = Vec::new();
    let mut clean_shutdown = true;

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix('#') {
            if header.is_none() {
                header = serde_json::from_str(rest.trim()).ok();
            }
            continue;
        }

        match serde_json::from_str::<CursorEvent>(line) {
            Ok(event) => events.push(event),
            // A torn final line is what a crash mid-write looks like.
            Err(_) if i + 1 == lines.len() => clean_shutdown = false,
            Err(e) => return Err(e),
        }
    }

    Ok(CursorLog {
        format: CursorLogFormat::Jsonl,
        header,
        events,
        clean_shutdown,
    })
}

fn parse_array_log(content: &str) -> Result<CursorLog, serde_json::Error> {
    if content.ends_with(']') {
        let events = serde_json::from_str(content)?;
        return Ok(CursorLog {
            format: CursorLogFormat::JsonArray,
            header: None,
            events,
            clean_shutdown: true,
        });
    }

    // Unclean shutdown: close the array after the last complete object.
    let mut body = content;
    loop {
        let candidate = format!("{}]", body.trim_end().trim_end_matches(','));
        if let Ok(events) = serde_json::from_str::<Vec<CursorEvent>>(&candidate) {
            return Ok(CursorLog {
                format: CursorLogFormat::JsonArray,
                header: None,
                events,
                clean_shutdown: false,
            });
        }

        match body.rfind('}') {
            Some(idx) if idx + 1 < body.len() => body = &body[..=idx],
            Some(idx) => body = &body[..idx],
            None => {
                // Nothing salvageable; surface the original parse error.
                return serde_json::from_str::<Vec<CursorEvent>>(content).map(|events| {
                    CursorLog {
                        format: CursorLogFormat::JsonArray,
                        header: None,
                        events,
                        clean_shutdown: false,
                    }
                });
            }
        }
    }
}

/// Serialize events to JSONL format.
pub fn serialize_events(events: &[CursorEvent]) -> Result<String, serde_json::Error> {
    let mut output = String::new();
    for event in events {
        output.push_str(&serde_json::to_string(event)?);
        output.push('\n');
    }
    Ok(output)
}
