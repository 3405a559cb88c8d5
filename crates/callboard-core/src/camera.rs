//! Camera module for pan/zoom transforms.
//!
//! The camera is purely local view state. Nothing here is synchronized with
//! peers, and world-space geometry never depends on it.

use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest allowed scale.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest allowed scale.
pub const MAX_ZOOM: f64 = 5.0;

/// Camera manages the view transform for the board.
///
/// Screen coordinates are relative to the page; `origin` is where the drawing
/// surface starts on the page, `offset` is the user's pan and `zoom` the scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Screen position of the drawing surface's top-left corner.
    pub origin: Vec2,
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current zoom level (1.0 = 100%).
    pub zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
    /// Size of the visible drawing surface in screen pixels.
    pub viewport: Size,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            origin: Vec2::ZERO,
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            viewport: Size::ZERO,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera for a surface placed at `origin` with the given size.
    pub fn with_viewport(origin: Vec2, viewport: Size) -> Self {
        Self {
            origin,
            viewport,
            ..Self::default()
        }
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.origin + self.offset) * Affine::scale(self.zoom)
    }

    /// World to surface-local pixels: pan and zoom only.
    ///
    /// A paint target sits at `origin` on the page already, so it must not
    /// be shifted by it again.
    pub fn view_transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Get the inverse transform for input handling.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-(self.origin + self.offset))
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Convert a screen-space distance (e.g. a brush width) to world space.
    pub fn screen_dist_to_world(&self, screen_dist: f64) -> f64 {
        screen_dist / self.zoom
    }

    /// Screen position of the viewport center.
    pub fn viewport_center(&self) -> Point {
        Point::new(
            self.origin.x + self.viewport.width / 2.0,
            self.origin.y + self.viewport.height / 2.0,
        )
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Adjust the zoom additively by `delta`, keeping the world point under
    /// `focal` (or the viewport center) stationary on screen.
    pub fn zoom_by(&mut self, delta: f64, focal: Option<Point>) {
        let focal = focal.unwrap_or_else(|| self.viewport_center());
        self.set_zoom_around(self.zoom + delta, focal);
    }

    /// Zoom the camera by a multiplicative factor, keeping the given screen point fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.set_zoom_around(self.zoom * factor, screen_point);
    }

    fn set_zoom_around(&mut self, requested: f64, focal: Point) {
        if !requested.is_finite() {
            return;
        }
        let new_zoom = requested.clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        let world_point = self.screen_to_world(focal);
        self.zoom = new_zoom;

        // Solve origin + offset + world * zoom == focal for the new offset.
        self.offset = Vec2::new(
            focal.x - self.origin.x - world_point.x * new_zoom,
            focal.y - self.origin.y - world_point.y * new_zoom,
        );
    }

    /// Reset camera to default position and zoom.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }
}
