//! Display, window and rectangle geometry.
//!
//! All positions are global desktop coordinates in points unless noted.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment test: `[x, x+w) × [y, y+h)`.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Information about a connected display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    /// Position in the global desktop.
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Backing scale factor (1.0, 2.0, ...).
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl DisplayInfo {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Resolution label such as `2560x1440`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width as u32, self.height as u32)
    }
}

/// Information about an on-screen window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: u32,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowInfo {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Compute a combined-desktop frame that includes all connected displays.
///
/// Used as the zeroing frame when no single display can be identified.
/// Returns `None` for an empty display list.
pub fn combined_desktop_bounds(displays: &[DisplayInfo]) -> Option<Rect> {
    if displays.is_empty() {
        return None;
    }

    let min_x = displays.iter().map(|d| d.x).fold(f64::INFINITY, f64::min);
    let min_y = displays.iter().map(|d| d.y).fold(f64::INFINITY, f64::min);
    let max_x = displays
        .iter()
        .map(|d| d.x + d.width)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_y = displays
        .iter()
        .map(|d| d.y + d.height)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(Rect::new(
        min_x,
        min_y,
        (max_x - min_x).max(1.0),
        (max_y - min_y).max(1.0),
    ))
}

/// Pick the primary display: flagged primary, else the one at the origin,
/// else the first.
pub fn primary_display(displays: &[DisplayInfo]) -> Option<&DisplayInfo> {
    displays
        .iter()
        .find(|d| d.is_primary)
        .or_else(|| displays.iter().find(|d| d.x == 0.0 && d.y == 0.0))
        .or_else(|| displays.first())
}
