//! Capture target resolution.
//!
//! Turns the targeting options of a recording request (display, window,
//! explicit area) into the native capture rectangle and the coordinate
//! contexts the cursor sampler needs.

use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_input_tracker::transform::{DisplayContext, RecordingModeContext};
use capsync_platform_core::{
    combined_desktop_bounds, primary_display, DisplayInfo, NativeBackend, Rect, WindowInfo,
};

use crate::session::RecordingOptions;

/// The resolved target of one recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTarget {
    pub display_id: Option<u32>,
    pub window_id: Option<u32>,
    /// Display-relative capture rectangle.
    pub capture_area: Option<Rect>,
    pub display: Option<DisplayContext>,
    pub mode: Option<RecordingModeContext>,
}

/// Locate a window and express its bounds relative to its display.
///
/// The owning display is the one containing the window's top-left corner.
/// A window outside every display is clamped onto the display at the
/// desktop origin.
pub fn window_capture_area(
    window_id: u32,
    windows: &[WindowInfo],
    displays: &[DisplayInfo],
) -> CapsyncResult<(u32, Rect)> {
    let window = windows
        .iter()
        .find(|w| w.id == window_id)
        .ok_or_else(|| CapsyncError::geometry(format!("window {window_id} not found")))?;

    if let Some(display) = displays
        .iter()
        .find(|d| d.bounds().contains(window.x, window.y))
    {
        let area = Rect::new(
            (window.x - display.x).max(0.0),
            (window.y - display.y).max(0.0),
            window.width,
            window.height,
        );
        return Ok((display.id, area));
    }

    let main = displays
        .iter()
        .find(|d| d.x == 0.0 && d.y == 0.0)
        .ok_or_else(|| {
            CapsyncError::geometry(format!("no display contains window {window_id}"))
        })?;

    let x = window.x.min(main.width - window.width).max(0.0);
    let y = window.y.min(main.height - window.height).max(0.0);
    Ok((main.id, Rect::new(x, y, window.width, window.height)))
}

/// Pick the zeroing frame: the requested display, else the primary one,
/// else the combined desktop.
pub fn display_context(displays: &[DisplayInfo], display_id: Option<u32>) -> Option<DisplayContext> {
    display_id
        .and_then(|id| displays.iter().find(|d| d.id == id))
        .or_else(|| primary_display(displays))
        .map(DisplayContext::from_display)
        .or_else(|| combined_desktop_bounds(displays).map(DisplayContext::combined))
}

/// Resolve the target of a recording. Never fails: a window that cannot
/// be placed degrades to a full-display recording.
pub fn resolve_target(backend: &dyn NativeBackend, options: &RecordingOptions) -> ResolvedTarget {
    let displays = backend.displays().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not enumerate displays");
        Vec::new()
    });

    let mut display_id = options.display_id;
    let mut window_id = options.window_id;
    let mut capture_area = options.capture_area;

    if let (Some(id), None) = (options.window_id, options.capture_area) {
        let resolved = backend
            .windows()
            .and_then(|windows| window_capture_area(id, &windows, &displays));
        match resolved {
            Ok((owner, area)) => {
                tracing::info!(
                    window_id = id,
                    display_id = owner,
                    x = area.x,
                    y = area.y,
                    width = area.width,
                    height = area.height,
                    "Resolved window capture area"
                );
                display_id = Some(owner);
                capture_area = Some(area);
            }
            Err(e) => {
                let e = match e {
                    e @ CapsyncError::GeometryResolutionFailed { .. } => e,
                    other => CapsyncError::geometry(other.to_string()),
                };
                tracing::warn!(error = %e, window_id = id, "Falling back to full-display capture");
                window_id = None;
            }
        }
    }

    let display = display_context(&displays, display_id);
    let mode = match (capture_area, window_id) {
        (Some(area), Some(window_id)) => Some(RecordingModeContext::Window { window_id, area }),
        (Some(area), None) => Some(RecordingModeContext::Area { area }),
        (None, _) => display.as_ref().map(RecordingModeContext::display),
    };

    ResolvedTarget {
        display_id,
        window_id,
        capture_area,
        display,
        mode,
    }
}
