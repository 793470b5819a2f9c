//! Mapping of page-viewport selections onto captured frame pixels.
//!
//! The captured tab frame is treated as the viewport letterboxed into the
//! frame: one uniform scale (the smaller of the horizontal and vertical
//! ratios) plus centering offsets for any bars the capture introduced.

use serde::{Deserialize, Serialize};

/// Smallest selection edge, in CSS pixels, that starts a recording.
pub const MIN_SELECTION_EDGE: f64 = 10.0;

/// A user-selected capture region in page viewport coordinates.
///
/// Carries the viewport and device metadata needed to translate the
/// rectangle into the pixel space of the captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRect {
    /// Left edge relative to the viewport.
    pub x: f64,
    /// Top edge relative to the viewport.
    pub y: f64,
    /// Selection width.
    pub width: f64,
    /// Selection height.
    pub height: f64,
    /// Device pixel ratio of the page.
    #[serde(default = "default_dpr")]
    pub dpr: f64,
    /// Visual viewport width.
    #[serde(default)]
    pub viewport_width: f64,
    /// Visual viewport height.
    #[serde(default)]
    pub viewport_height: f64,
    /// Horizontal offset of the visual viewport (pinch zoom).
    #[serde(default)]
    pub viewport_offset_x: f64,
    /// Vertical offset of the visual viewport (pinch zoom).
    #[serde(default)]
    pub viewport_offset_y: f64,
    /// Outer browser window width.
    #[serde(default)]
    pub outer_width: f64,
    /// Outer browser window height.
    #[serde(default)]
    pub outer_height: f64,
}

fn default_dpr() -> f64 {
    1.0
}

impl SelectionRect {
    /// Whether both edges reach the minimum selectable size.
    pub fn meets_minimum(&self) -> bool {
        self.width >= MIN_SELECTION_EDGE && self.height >= MIN_SELECTION_EDGE
    }
}

/// Sub-rectangle of the captured frame, in frame pixels, that gets recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRegion {
    /// Left edge in frame pixels.
    pub x: u32,
    /// Top edge in frame pixels.
    pub y: u32,
    /// Width in frame pixels, at least 1.
    pub width: u32,
    /// Height in frame pixels, at least 1.
    pub height: u32,
}

impl SourceRegion {
    /// Map `rect` into a `frame_width` x `frame_height` capture.
    ///
    /// A missing viewport size falls back to 1 so the scale stays finite.
    /// The result always lies inside the frame and is never empty.
    pub fn map(rect: &SelectionRect, frame_width: u32, frame_height: u32) -> Self {
        let frame_w = f64::from(frame_width);
        let frame_h = f64::from(frame_height);
        let viewport_w = positive_or_one(rect.viewport_width);
        let viewport_h = positive_or_one(rect.viewport_height);

        let scale = (frame_w / viewport_w).min(frame_h / viewport_h);
        let offset_x = ((frame_w - viewport_w * scale) / 2.0).max(0.0);
        let offset_y = ((frame_h - viewport_h * scale) / 2.0).max(0.0);

        let sx = ((rect.x + finite_or_zero(rect.viewport_offset_x)) * scale + offset_x).round();
        let sy = ((rect.y + finite_or_zero(rect.viewport_offset_y)) * scale + offset_y).round();
        let sw = (rect.width * scale).round();
        let sh = (rect.height * scale).round();

        let max_x = frame_w - 1.0;
        let max_y = frame_h - 1.0;
        let sx = sx.clamp(0.0, max_x.max(0.0));
        let sy = sy.clamp(0.0, max_y.max(0.0));
        let bounded_w = sw.min(frame_w - sx).max(1.0);
        let bounded_h = sh.min(frame_h - sy).max(1.0);

        Self {
            x: sx as u32,
            y: sy as u32,
            width: bounded_w.floor() as u32,
            height: bounded_h.floor() as u32,
        }
    }
}

fn positive_or_one(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 1.0 }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
