//! Selection and manipulation handle system.

use crate::element::{ElementId, Properties};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 8.0;
/// Padding between an element and its selection outline, in screen pixels.
pub const SELECTION_PADDING: f64 = 4.0;
/// Handle hit tolerance in world units.
pub const HANDLE_HIT_TOLERANCE: f64 = 10.0;

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Corner handle for rectangles/images.
    Corner(Corner),
    /// Tail of an arrow.
    Start,
    /// Head of an arrow.
    End,
}

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl HandleKind {
    /// Short tag ("tl", "tr", "bl", "br", "start", "end").
    pub fn tag(self) -> &'static str {
        match self {
            HandleKind::Corner(Corner::TopLeft) => "tl",
            HandleKind::Corner(Corner::TopRight) => "tr",
            HandleKind::Corner(Corner::BottomLeft) => "bl",
            HandleKind::Corner(Corner::BottomRight) => "br",
            HandleKind::Start => "start",
            HandleKind::End => "end",
        }
    }
}

/// A selection handle with its position and type.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    /// Position in world coordinates.
    pub position: Point,
    /// Handle type.
    pub kind: HandleKind,
}

impl Handle {
    /// Create a new handle.
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a point (in world coordinates) lies within `tolerance`
    /// of this handle on both axes.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        (point.x - self.position.x).abs() <= tolerance
            && (point.y - self.position.y).abs() <= tolerance
    }
}

/// Get the selection handles for an element, in hit-test precedence order.
///
/// Corners are taken from the stored geometry, so a rectangle with a
/// negative width keeps its `TopLeft` handle at (x, y).
pub fn get_handles(properties: &Properties) -> Vec<Handle> {
    match properties {
        Properties::Rect { x, y, width, height, .. }
        | Properties::Image { x, y, width, height, .. } => {
            let (x0, y0, x1, y1) = (*x, *y, x + width, y + height);
            vec![
                Handle::new(Point::new(x0, y0), HandleKind::Corner(Corner::TopLeft)),
                Handle::new(Point::new(x1, y0), HandleKind::Corner(Corner::TopRight)),
                Handle::new(Point::new(x0, y1), HandleKind::Corner(Corner::BottomLeft)),
                Handle::new(Point::new(x1, y1), HandleKind::Corner(Corner::BottomRight)),
            ]
        }
        Properties::Arrow { x, y, x2, y2, .. } => vec![
            Handle::new(Point::new(*x, *y), HandleKind::Start),
            Handle::new(Point::new(*x2, *y2), HandleKind::End),
        ],
        Properties::Text { .. } => Vec::new(),
    }
}

/// Find which handle (if any) is hit at the given point.
/// The first handle in [`get_handles`] order wins.
pub fn hit_test_handles(properties: &Properties, point: Point, tolerance: f64) -> Option<HandleKind> {
    get_handles(properties)
        .into_iter()
        .find(|handle| handle.hit_test(point, tolerance))
        .map(|handle| handle.kind)
}

/// Apply a handle drag to the original geometry.
///
/// `delta` is the cumulative pointer movement since the drag started.
/// Widths and heights may go negative. A handle that does not belong
/// to this kind leaves the geometry unchanged.
pub fn apply_resize(original: &Properties, handle: HandleKind, delta: Vec2) -> Properties {
    let mut props = original.clone();
    let (dx, dy) = (delta.x, delta.y);

    match (&mut props, handle) {
        (
            Properties::Rect { x, y, width, height, .. }
            | Properties::Image { x, y, width, height, .. },
            HandleKind::Corner(corner),
        ) => match corner {
            Corner::BottomRight => {
                *width += dx;
                *height += dy;
            }
            Corner::BottomLeft => {
                *x += dx;
                *width -= dx;
                *height += dy;
            }
            Corner::TopRight => {
                *y += dy;
                *width += dx;
                *height -= dy;
            }
            Corner::TopLeft => {
                *x += dx;
                *y += dy;
                *width -= dx;
                *height -= dy;
            }
        },
        (Properties::Arrow { x, y, .. }, HandleKind::Start) => {
            *x += dx;
            *y += dy;
        }
        (Properties::Arrow { x2, y2, .. }, HandleKind::End) => {
            *x2 += dx;
            *y2 += dy;
        }
        _ => {}
    }

    props
}

/// Translate the original geometry by the cumulative drag delta.
pub fn apply_move(original: &Properties, delta: Vec2) -> Properties {
    let mut props = original.clone();
    props.translate(delta);
    props
}

/// State of an active manipulation (move or handle drag) on one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ManipulationState {
    /// The element being manipulated.
    pub element_id: ElementId,
    /// The handle being dragged (None = moving the whole element).
    pub handle: Option<HandleKind>,
    /// World point where the drag started.
    pub start_point: Point,
    /// Properties captured at drag start.
    pub original: Properties,
}

impl ManipulationState {
    /// Create a new manipulation state.
    pub fn new(element_id: ElementId, handle: Option<HandleKind>, start_point: Point, original: Properties) -> Self {
        Self {
            element_id,
            handle,
            start_point,
            original,
        }
    }

    /// Cumulative drag delta to the given world point.
    pub fn delta_to(&self, point: Point) -> Vec2 {
        point - self.start_point
    }

    /// Geometry for the element with the pointer at `point`.
    ///
    /// Always derived from the captured original, never from the previous frame.
    pub fn properties_at(&self, point: Point) -> Properties {
        let delta = self.delta_to(point);
        match self.handle {
            Some(handle) => apply_resize(&self.original, handle, delta),
            None => apply_move(&self.original, delta),
        }
    }
}
