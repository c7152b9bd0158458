//! Coordinate transformation from raw global pointer samples into the
//! coordinate space of a recording.
//!
//! Two steps, each optional depending on what is known about the recording:
//! 1. display-relative = raw - display origin
//! 2. video-relative = display-relative - video offset
//!
//! Out-of-frame samples are kept and tagged `-outside` so playback keeps
//! stroke continuity and consumers decide what to do with excursions.

use capsync_platform_core::{DisplayInfo, PointerEventType, Rect, WindowInfo};
use capsync_project_model::event::{CoordinateSystem, CursorLocation, RecordingType, WindowRelative};
use serde::{Deserialize, Serialize};

/// A point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The frame raw global coordinates are zeroed against: a display, or a
/// synthesized combined-desktop frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayContext {
    /// `None` for a synthesized combined-desktop frame.
    pub display_id: Option<u32>,
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayContext {
    pub fn from_display(display: &DisplayInfo) -> Self {
        Self {
            display_id: Some(display.id),
            origin_x: display.x,
            origin_y: display.y,
            width: display.width,
            height: display.height,
        }
    }

    /// Build a context from a combined-desktop frame.
    pub fn combined(frame: Rect) -> Self {
        Self {
            display_id: None,
            origin_x: frame.x,
            origin_y: frame.y,
            width: frame.width,
            height: frame.height,
        }
    }
}

/// What is being recorded, with the video frame expressed relative to the
/// display. For `Display` the frame starts at the display origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RecordingModeContext {
    Display { width: f64, height: f64 },
    Window { window_id: u32, area: Rect },
    Area { area: Rect },
}

impl RecordingModeContext {
    /// Full-display recording of the given display.
    pub fn display(display: &DisplayContext) -> Self {
        Self::Display {
            width: display.width,
            height: display.height,
        }
    }

    /// Offset of the video frame inside the display.
    pub fn video_offset(&self) -> Point {
        match self {
            Self::Display { .. } => Point::default(),
            Self::Window { area, .. } | Self::Area { area } => Point::new(area.x, area.y),
        }
    }

    /// Size of the video frame.
    pub fn video_size(&self) -> (f64, f64) {
        match self {
            Self::Display { width, height } => (*width, *height),
            Self::Window { area, .. } | Self::Area { area } => (area.width, area.height),
        }
    }

    /// The video frame in display-relative coordinates.
    pub fn video_frame(&self) -> Rect {
        let offset = self.video_offset();
        let (width, height) = self.video_size();
        Rect::new(offset.x, offset.y, width, height)
    }

    pub fn recording_type(&self) -> RecordingType {
        match self {
            Self::Display { .. } => RecordingType::Display,
            Self::Window { .. } => RecordingType::Window,
            Self::Area { .. } => RecordingType::Area,
        }
    }
}

/// Result of transforming one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformed {
    pub x: f64,
    pub y: f64,
    pub coordinate_system: CoordinateSystem,
}

fn within(x: f64, y: f64, width: f64, height: f64) -> bool {
    x >= 0.0 && x < width && y >= 0.0 && y < height
}

/// Transform a raw global sample into the recording's coordinate space.
///
/// Without a display the raw sample is returned as `global`. Without a
/// mode context the sample stops at display-relative and is bounds-checked
/// against the display.
pub fn transform(
    raw: Point,
    ctx: Option<&RecordingModeContext>,
    display: Option<&DisplayContext>,
) -> Transformed {
    let Some(display) = display else {
        return Transformed {
            x: raw.x,
            y: raw.y,
            coordinate_system: CoordinateSystem::Global,
        };
    };

    let dx = raw.x - display.origin_x;
    let dy = raw.y - display.origin_y;

    let (x, y, system, (width, height)) = match ctx {
        Some(ctx) => {
            let offset = ctx.video_offset();
            (
                dx - offset.x,
                dy - offset.y,
                CoordinateSystem::VideoRelative,
                ctx.video_size(),
            )
        }
        None => (
            dx,
            dy,
            CoordinateSystem::DisplayRelative,
            (display.width, display.height),
        ),
    };

    let coordinate_system = if within(x, y, width, height) {
        system
    } else {
        system.outside()
    };

    Transformed {
        x,
        y,
        coordinate_system,
    }
}

/// Find the window under a global point.
///
/// `windows` must be ordered front-to-back: the first match is the topmost
/// window and wins when bounds overlap.
pub fn window_at(point: Point, windows: &[WindowInfo]) -> Option<&WindowInfo> {
    windows.iter().find(|w| w.bounds().contains(point.x, point.y))
}

/// Classify a global sample as hovering and/or clicking a window.
pub fn locate(point: Point, windows: &[WindowInfo], event_type: PointerEventType) -> CursorLocation {
    let hover = window_at(point, windows).map(|w| w.id);
    CursorLocation {
        hover,
        click: if event_type.is_click() { hover } else { None },
    }
}

/// Position relative to the top-left of the window under the point.
pub fn window_relative(point: Point, windows: &[WindowInfo]) -> Option<WindowRelative> {
    window_at(point, windows).map(|w| WindowRelative {
        window_id: w.id,
        x: point.x - w.x,
        y: point.y - w.y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn display_at(x: f64, y: f64) -> DisplayContext {
        DisplayContext {
            display_id: Some(1),
            origin_x: x,
            origin_y: y,
            width: 1920.0,
            height: 1080.0,
        }
    }

    fn window(id: u32, x: f64, y: f64, width: f64, height: f64) -> WindowInfo {
        WindowInfo {
            id,
            app_name: format!("app-{id}"),
            title: String::new(),
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn window_area_sample_is_video_relative() {
        let display = display_at(0.0, 0.0);
        let ctx = RecordingModeContext::Window {
            window_id: 7,
            area: Rect::new(10.0, 20.0, 100.0, 50.0),
        };

        let t = transform(Point::new(15.0, 25.0), Some(&ctx), Some(&display));
        assert_eq!((t.x, t.y), (5.0, 5.0));
        assert_eq!(t.coordinate_system, CoordinateSystem::VideoRelative);
    }

    #[test]
    fn secondary_display_origin_is_subtracted_first() {
        let display = display_at(-1920.0, 200.0);
        let ctx = RecordingModeContext::Area {
            area: Rect::new(100.0, 100.0, 400.0, 300.0),
        };

        let t = transform(Point::new(-1700.0, 450.0), Some(&ctx), Some(&display));
        assert_eq!((t.x, t.y), (120.0, 150.0));
        assert_eq!(t.coordinate_system, CoordinateSystem::VideoRelative);
    }

    #[test]
    fn excursions_are_tagged_not_dropped() {
        let display = display_at(0.0, 0.0);
        let ctx = RecordingModeContext::Area {
            area: Rect::new(10.0, 20.0, 100.0, 50.0),
        };

        let t = transform(Point::new(5.0, 25.0), Some(&ctx), Some(&display));
        assert_eq!((t.x, t.y), (-5.0, 5.0));
        assert_eq!(t.coordinate_system, CoordinateSystem::VideoRelativeOutside);

        // Right/bottom edges are exclusive.
        let t = transform(Point::new(110.0, 25.0), Some(&ctx), Some(&display));
        assert_eq!(t.coordinate_system, CoordinateSystem::VideoRelativeOutside);
    }

    #[test]
    fn missing_context_degrades_gracefully() {
        let display = display_at(100.0, 0.0);

        let t = transform(Point::new(150.0, 10.0), None, Some(&display));
        assert_eq!((t.x, t.y), (50.0, 10.0));
        assert_eq!(t.coordinate_system, CoordinateSystem::DisplayRelative);

        let t = transform(Point::new(50.0, 10.0), None, Some(&display));
        assert_eq!(t.coordinate_system, CoordinateSystem::DisplayRelativeOutside);

        let t = transform(Point::new(-3.0, 4.0), None, None);
        assert_eq!((t.x, t.y), (-3.0, 4.0));
        assert_eq!(t.coordinate_system, CoordinateSystem::Global);
    }

    #[test]
    fn combined_desktop_frame_acts_as_display() {
        let ctx = DisplayContext::combined(Rect::new(-1920.0, 0.0, 4480.0, 1440.0));
        let t = transform(Point::new(-1920.0, 0.0), None, Some(&ctx));
        assert_eq!((t.x, t.y), (0.0, 0.0));
        assert_eq!(ctx.display_id, None);
    }

    #[test]
    fn locate_prefers_first_window_in_front_to_back_order() {
        let windows = vec![
            window(1, 0.0, 0.0, 200.0, 200.0),
            window(2, 100.0, 100.0, 200.0, 200.0),
        ];

        let overlap = Point::new(150.0, 150.0);
        assert_eq!(
            locate(overlap, &windows, PointerEventType::Move),
            CursorLocation {
                hover: Some(1),
                click: None
            }
        );
        assert_eq!(
            locate(overlap, &windows, PointerEventType::MouseDown),
            CursorLocation {
                hover: Some(1),
                click: Some(1)
            }
        );
        assert_eq!(
            locate(Point::new(250.0, 250.0), &windows, PointerEventType::RightMouseUp).click,
            Some(2)
        );
        assert_eq!(
            locate(Point::new(900.0, 900.0), &windows, PointerEventType::MouseDown),
            CursorLocation::default()
        );
    }

    #[test]
    fn window_relative_uses_hovered_window_origin() {
        let windows = vec![window(9, 300.0, 120.0, 640.0, 480.0)];
        let rel = window_relative(Point::new(310.0, 125.0), &windows).unwrap();
        assert_eq!(rel.window_id, 9);
        assert_eq!((rel.x, rel.y), (10.0, 5.0));
        assert!(window_relative(Point::new(0.0, 0.0), &windows).is_none());
    }

    proptest! {
        #[test]
        fn display_mode_is_plain_origin_subtraction(
            x in -5000.0f64..5000.0,
            y in -5000.0f64..5000.0,
            ox in -4000.0f64..4000.0,
            oy in -4000.0f64..4000.0,
        ) {
            let display = display_at(ox, oy);
            let ctx = RecordingModeContext::display(&display);
            let t = transform(Point::new(x, y), Some(&ctx), Some(&display));
            prop_assert_eq!(t.x, x - ox);
            prop_assert_eq!(t.y, y - oy);
        }

        #[test]
        fn outside_tag_matches_video_bounds(
            x in -500.0f64..1500.0,
            y in -500.0f64..1500.0,
            ax in 0.0f64..400.0,
            ay in 0.0f64..400.0,
            w in 1.0f64..800.0,
            h in 1.0f64..800.0,
        ) {
            let display = display_at(0.0, 0.0);
            let ctx = RecordingModeContext::Area { area: Rect::new(ax, ay, w, h) };
            let t = transform(Point::new(x, y), Some(&ctx), Some(&display));
            let inside = t.x >= 0.0 && t.x < w && t.y >= 0.0 && t.y < h;
            prop_assert_eq!(t.coordinate_system.is_outside(), !inside);
            prop_assert!(t.coordinate_system.as_str().ends_with("-outside") == !inside);
        }
    }
}
