//! Continuous zoom/pan state for the displayed view unit.
//!
//! The transform maps frame coordinates to screen coordinates as
//! `screen = frame * zoom + pan`, with `pan` in viewport pixels. Zoom is
//! clamped to `[1, 8]`, and a zoom of exactly 1 always carries a zero pan so
//! the unzoomed state is unique.

use std::ops::{Add, Mul, Sub};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 8.0;

/// Selections smaller than this (either side) are treated as accidental and
/// never trigger zoom-to-selection.
pub const MIN_SELECTION_PX: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, factor: f32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }
}

pub fn clamp_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        MIN_ZOOM
    } else {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    }
}

/// Axis-aligned rectangle in viewport-local pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SelectionRect {
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn meets_minimum(&self) -> bool {
        self.width >= MIN_SELECTION_PX && self.height >= MIN_SELECTION_PX
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub zoom: f32,
    pub pan: Vec2,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            pan: Vec2::ZERO,
        }
    }
}

impl ViewportTransform {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        (self.zoom - MIN_ZOOM).abs() < f32::EPSILON
    }

    /// Changes zoom so that the frame point under `anchor` stays under
    /// `anchor`. Zooming out to unity recenters unconditionally.
    pub fn zoom_about(self, anchor: Vec2, new_zoom: f32) -> Self {
        let zoom = clamp_zoom(new_zoom);
        if zoom <= MIN_ZOOM {
            return Self::default();
        }
        let ratio = zoom / self.zoom;
        Self {
            zoom,
            pan: anchor * (1.0 - ratio) + self.pan * ratio,
        }
    }

    /// Wheel zoom: a fixed step per notch, anchored at the cursor.
    pub fn wheel_zoom(self, notches: f32, step: f32, cursor: Vec2) -> Self {
        self.zoom_about(cursor, self.zoom + notches * step)
    }

    pub fn with_pan(self, pan: Vec2) -> Self {
        if self.is_identity() {
            return Self::default();
        }
        Self { pan, ..self }
    }

    /// Rectangle of the untransformed frame visible through a viewport of
    /// the given size, in frame coordinates.
    pub fn visible_region(&self, viewport: Vec2) -> SelectionRect {
        SelectionRect {
            x: -self.pan.x / self.zoom,
            y: -self.pan.y / self.zoom,
            width: viewport.x / self.zoom,
            height: viewport.y / self.zoom,
        }
    }
}

/// Replaces the transform so the selected region fills the viewport: the new
/// zoom is the largest that keeps the whole selection visible (clamped to
/// [1, 8]) and the selection's center lands on the viewport center.
///
/// The selection is in screen coordinates of the transform passed in, so both
/// must be captured in the same step with no transform change in between.
pub fn zoom_to_selection(
    current: ViewportTransform,
    selection: SelectionRect,
    viewport: Vec2,
) -> ViewportTransform {
    if selection.width <= 0.0 || selection.height <= 0.0 {
        return current;
    }
    let fit = (viewport.x / selection.width).min(viewport.y / selection.height);
    if !fit.is_finite() || fit <= 0.0 {
        return current;
    }
    let center = selection.center();
    let zoomed = current.zoom_about(center, current.zoom * fit);
    if zoomed.is_identity() {
        return ViewportTransform::default();
    }
    let viewport_center = Vec2::new(viewport.x / 2.0, viewport.y / 2.0);
    ViewportTransform {
        zoom: zoomed.zoom,
        pan: zoomed.pan + (viewport_center - center),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn zoom_is_clamped_to_range() {
        assert_eq!(clamp_zoom(0.25), MIN_ZOOM);
        assert_eq!(clamp_zoom(12.0), MAX_ZOOM);
        assert_eq!(clamp_zoom(f32::NAN), MIN_ZOOM);
        assert_eq!(clamp_zoom(f32::INFINITY), MIN_ZOOM);
    }

    #[test]
    fn wheel_zoom_keeps_cursor_point_fixed() {
        let cursor = Vec2::new(300.0, 200.0);
        let start = ViewportTransform {
            zoom: 2.0,
            pan: Vec2::new(-50.0, -80.0),
        };
        let frame_point = (cursor - start.pan) * (1.0 / start.zoom);

        let next = start.wheel_zoom(1.0, 0.5, cursor);
        assert_close(next.zoom, 2.5);
        let screen = frame_point * next.zoom + next.pan;
        assert_close(screen.x, cursor.x);
        assert_close(screen.y, cursor.y);
    }

    #[test]
    fn zooming_out_to_unity_recenters() {
        let start = ViewportTransform {
            zoom: 1.5,
            pan: Vec2::new(-120.0, 40.0),
        };
        let next = start.wheel_zoom(-1.0, 0.5, Vec2::new(10.0, 10.0));
        assert_eq!(next, ViewportTransform::default());
    }

    #[test]
    fn wheel_zoom_saturates_at_maximum() {
        let start = ViewportTransform {
            zoom: 7.9,
            pan: Vec2::ZERO,
        };
        let next = start.wheel_zoom(3.0, 0.5, Vec2::new(100.0, 100.0));
        assert_close(next.zoom, MAX_ZOOM);
    }

    #[test]
    fn selection_zoom_fits_the_smaller_ratio_and_centers() {
        // 100x80 selection on an 800x600 viewport at zoom 1:
        // min(800/100, 600/80) = 7.5.
        let selection = SelectionRect {
            x: 150.0,
            y: 100.0,
            width: 100.0,
            height: 80.0,
        };
        let viewport = Vec2::new(800.0, 600.0);
        let next = zoom_to_selection(ViewportTransform::default(), selection, viewport);
        assert_close(next.zoom, 7.5);

        // The selection center (a frame point, since zoom was 1) must land on
        // the viewport center.
        let center = selection.center();
        let screen = center * next.zoom + next.pan;
        assert_close(screen.x, 400.0);
        assert_close(screen.y, 300.0);
    }

    #[test]
    fn selection_zoom_clamps_at_maximum() {
        let selection = SelectionRect {
            x: 0.0,
            y: 0.0,
            width: 40.0,
            height: 40.0,
        };
        let next = zoom_to_selection(
            ViewportTransform::default(),
            selection,
            Vec2::new(800.0, 600.0),
        );
        assert_close(next.zoom, MAX_ZOOM);
    }

    #[test]
    fn minimum_selection_threshold_rejects_slivers() {
        let thin = SelectionRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 12.0,
        };
        assert!(!thin.meets_minimum());
        let ok = SelectionRect {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
        };
        assert!(ok.meets_minimum());
    }

    #[test]
    fn visible_region_inverts_the_transform() {
        let transform = ViewportTransform {
            zoom: 2.0,
            pan: Vec2::new(-100.0, -60.0),
        };
        let region = transform.visible_region(Vec2::new(800.0, 600.0));
        assert_close(region.x, 50.0);
        assert_close(region.y, 30.0);
        assert_close(region.width, 400.0);
        assert_close(region.height, 300.0);
    }
}
