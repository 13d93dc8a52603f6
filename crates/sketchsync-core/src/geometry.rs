//! Hit testing and measurement for elements.
//!
//! Everything here is a pure function of its inputs. Coordinate transforms
//! between screen and world space live on [`crate::Camera`].

use crate::element::{Element, Properties};
use crate::selection::{self, HandleKind};
use kurbo::{Point, Rect};

/// Extra world units around a shape that still count as a hit.
pub const HIT_PADDING: f64 = 10.0;
/// Approximate average glyph width used to size text boxes.
pub const GLYPH_WIDTH: f64 = 8.0;
/// Line height used to size text boxes.
pub const LINE_HEIGHT: f64 = 16.0;

/// Tunable measurements used by hit testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub hit_padding: f64,
    pub handle_tolerance: f64,
    pub glyph_width: f64,
    pub line_height: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            hit_padding: HIT_PADDING,
            handle_tolerance: selection::HANDLE_HIT_TOLERANCE,
            glyph_width: GLYPH_WIDTH,
            line_height: LINE_HEIGHT,
        }
    }
}

/// Distance from `point` to the segment `a`-`b`.
///
/// The projection parameter is clamped to [0, 1], so points beyond either
/// end measure to that endpoint. A degenerate segment measures to `a`.
pub fn distance_point_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let ap = point - a;
    let len_sq = ab.hypot2();

    if len_sq == 0.0 {
        return ap.hypot();
    }

    let t = (ap.dot(ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (point - closest).hypot()
}

/// Box occupied by a text element centered on `center`.
pub fn text_bounds(center: Point, text: &str, metrics: &Metrics) -> Rect {
    let width = text.chars().count() as f64 * metrics.glyph_width;
    let height = metrics.line_height;
    Rect::from_center_size(center, (width, height))
}

/// Axis-aligned bounds of an element's geometry (normalized).
pub fn bounds(properties: &Properties, metrics: &Metrics) -> Rect {
    match properties {
        Properties::Rect { x, y, width, height, .. }
        | Properties::Image { x, y, width, height, .. } => {
            Rect::new(*x, *y, x + width, y + height).abs()
        }
        Properties::Arrow { x, y, x2, y2, .. } => {
            Rect::from_points(Point::new(*x, *y), Point::new(*x2, *y2))
        }
        Properties::Text { x, y, text, .. } => text_bounds(Point::new(*x, *y), text, metrics),
    }
}

/// Whether `point` hits the element geometry, including padding.
pub fn contains(properties: &Properties, point: Point, metrics: &Metrics) -> bool {
    let pad = metrics.hit_padding;
    match properties {
        Properties::Arrow { x, y, x2, y2, .. } => {
            distance_point_to_segment(point, Point::new(*x, *y), Point::new(*x2, *y2)) <= pad
        }
        Properties::Rect { .. } | Properties::Image { .. } | Properties::Text { .. } => {
            let padded = bounds(properties, metrics).inflate(pad, pad);
            padded.x0 <= point.x && point.x <= padded.x1 && padded.y0 <= point.y && point.y <= padded.y1
        }
    }
}

/// Top-most element under `point`, or `None`.
///
/// Elements later in the slice are drawn on top, so the search runs back to front.
pub fn hit_test<'a>(point: Point, elements: &'a [Element], metrics: &Metrics) -> Option<&'a Element> {
    elements
        .iter()
        .rev()
        .find(|element| contains(&element.properties, point, metrics))
}

/// Resize handle of `element` under `point`, or `None`.
///
/// Corners are tested tl, tr, bl, br and arrow endpoints start, end;
/// the first match wins. Text has no handles.
pub fn resize_handle_at(point: Point, element: &Element, metrics: &Metrics) -> Option<HandleKind> {
    selection::hit_test_handles(&element.properties, point, metrics.handle_tolerance)
}
