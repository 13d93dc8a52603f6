//! Camera module for pan/zoom transforms.

use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest zoom the camera allows by default.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest zoom the camera allows by default.
pub const MAX_ZOOM: f64 = 5.0;

/// Camera manages the view transform for the canvas.
///
/// `offset` is the screen-space position of the world origin and `zoom`
/// scales world units to pixels, so `screen = world * zoom + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan)
    pub offset: Vec2,
    /// Current zoom level (1.0 = 100%)
    pub zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera with custom zoom bounds.
    pub fn with_zoom_bounds(min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            min_zoom,
            max_zoom,
            ..Self::default()
        }
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Get the inverse transform for input handling.
    ///
    /// This transform converts screen coordinates to world coordinates.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            (screen_point.x - self.offset.x) / self.zoom,
            (screen_point.y - self.offset.y) / self.zoom,
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            world_point.x * self.zoom + self.offset.x,
            world_point.y * self.zoom + self.offset.y,
        )
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Set an absolute zoom level, keeping the given screen point fixed.
    ///
    /// The zoom is clamped to `[min_zoom, max_zoom]` before the offset is solved.
    pub fn zoom_to(&mut self, screen_point: Point, zoom: f64) {
        let new_zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        // World point under the anchor, using the old zoom
        let world_point = self.screen_to_world(screen_point);

        self.zoom = new_zoom;

        // Solve for the offset that maps world_point back onto screen_point
        self.offset = Vec2::new(
            screen_point.x - world_point.x * new_zoom,
            screen_point.y - world_point.y * new_zoom,
        );
    }

    /// Zoom the camera by a factor, keeping the given screen point fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.zoom_to(screen_point, self.zoom * factor);
    }

    /// World point at the center of a viewport of the given size.
    pub fn viewport_center_world(&self, viewport: Size) -> Point {
        self.screen_to_world(Point::new(viewport.width / 2.0, viewport.height / 2.0))
    }

    /// Reset camera to default position and zoom.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }
}
