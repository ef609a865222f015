//! Session-local pan/zoom state and the screen ↔ world transform.
//!
//! `screen = world * zoom + pan`. Viewport state is never persisted.

use crate::geometry::Point;

/// Multiplicative step used by [`Viewport::zoom_in`] / [`Viewport::zoom_out`].
pub const ZOOM_STEP: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    min_zoom: f32,
    max_zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::with_bounds(0.25, 4.0)
    }
}

impl Viewport {
    /// Identity viewport clamped to `[min_zoom, max_zoom]`.
    ///
    /// Bounds are sanitised so zoom always stays strictly positive.
    #[must_use]
    pub fn with_bounds(min_zoom: f32, max_zoom: f32) -> Self {
        let min_zoom = if min_zoom > 0.0 { min_zoom } else { f32::EPSILON };
        let max_zoom = max_zoom.max(min_zoom);
        Self {
            zoom: 1.0_f32.clamp(min_zoom, max_zoom),
            pan_x: 0.0,
            pan_y: 0.0,
            min_zoom,
            max_zoom,
        }
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn pan(&self) -> Point {
        Point::new(self.pan_x, self.pan_y)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.pan_x) / self.zoom,
            (screen.y - self.pan_y) / self.zoom,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.zoom + self.pan_x,
            world.y * self.zoom + self.pan_y,
        )
    }

    fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Multiply zoom by `factor`, keeping the world point under the screen
    /// position `cursor` fixed. Returns `false` if zoom did not change.
    pub fn zoom_at(&mut self, cursor: Point, factor: f32) -> bool {
        self.set_zoom_at(cursor, self.zoom * factor)
    }

    /// Set zoom to `zoom` (clamped) anchored at `cursor`.
    pub fn set_zoom_at(&mut self, cursor: Point, zoom: f32) -> bool {
        let old = self.zoom;
        let new = self.clamp_zoom(zoom);
        if new == old {
            return false;
        }
        let ratio = new / old;
        self.pan_x = cursor.x - (cursor.x - self.pan_x) * ratio;
        self.pan_y = cursor.y - (cursor.y - self.pan_y) * ratio;
        self.zoom = new;
        true
    }

    /// Zoom in by `step` around the screen origin.
    pub fn zoom_in(&mut self, step: f32) -> bool {
        self.zoom_at(Point::default(), step)
    }

    pub fn zoom_out(&mut self, step: f32) -> bool {
        self.zoom_at(Point::default(), 1.0 / step)
    }

    /// Zoom 1, no pan (zoom is clamped if 1 lies outside the bounds).
    pub fn reset(&mut self) {
        self.zoom = self.clamp_zoom(1.0);
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    pub fn pan_to(&mut self, x: f32, y: f32) {
        self.pan_x = x;
        self.pan_y = y;
    }

    /// Put the world origin in the middle of a `width × height` canvas.
    pub fn center_origin(&mut self, width: f32, height: f32) {
        self.pan_to(width / 2.0, height / 2.0);
    }

    /// World coordinates of the centre of a `width × height` canvas.
    pub fn visible_center(&self, width: f32, height: f32) -> Point {
        self.screen_to_world(Point::new(width / 2.0, height / 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn screen_world_roundtrip() {
        let mut vp = Viewport::default();
        vp.pan_to(37.5, -12.0);
        vp.zoom = 1.7;
        let p = Point::new(123.0, 456.0);
        assert!(close(vp.screen_to_world(vp.world_to_screen(p)), p));
    }

    #[test]
    fn wheel_zoom_keeps_cursor_fixed() {
        let mut vp = Viewport::default();
        vp.pan_to(20.0, 30.0);
        let cursor = Point::new(400.0, 250.0);
        let before = vp.screen_to_world(cursor);
        assert!(vp.zoom_at(cursor, 1.1));
        assert!(close(vp.screen_to_world(cursor), before));
        assert!(vp.zoom_at(cursor, 0.9));
        assert!(close(vp.screen_to_world(cursor), before));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = Viewport::with_bounds(0.25, 4.0);
        for _ in 0..50 {
            vp.zoom_at(Point::new(10.0, 10.0), 1.1);
        }
        assert_eq!(vp.zoom, 4.0);
        assert!(!vp.zoom_at(Point::new(10.0, 10.0), 1.1));
        for _ in 0..50 {
            vp.zoom_out(ZOOM_STEP);
        }
        assert_eq!(vp.zoom, 0.25);
    }

    #[test]
    fn non_positive_bounds_are_sanitised() {
        let vp = Viewport::with_bounds(0.0, -1.0);
        let (lo, hi) = vp.bounds();
        assert!(lo > 0.0 && hi >= lo);
        assert!(vp.zoom > 0.0);
    }

    #[test]
    fn reset_restores_identity() {
        let mut vp = Viewport::default();
        vp.zoom_in(ZOOM_STEP);
        vp.pan_to(5.0, 5.0);
        vp.reset();
        assert_eq!((vp.zoom, vp.pan_x, vp.pan_y), (1.0, 0.0, 0.0));
    }

    #[test]
    fn centred_origin() {
        let mut vp = Viewport::default();
        vp.center_origin(800.0, 600.0);
        assert_eq!(vp.visible_center(800.0, 600.0), Point::new(0.0, 0.0));
    }
}
