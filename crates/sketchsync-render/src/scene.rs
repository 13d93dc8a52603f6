//! Display-list renderer.
//!
//! [`SceneBuilder`] turns a [`RenderContext`] into screen-space
//! [`DrawCommand`]s that any 2-D backend can replay.

use crate::renderer::{RenderContext, RenderResult, Renderer, RendererError};
use kurbo::{Affine, BezPath, Point, Rect, Shape, Vec2};
use peniko::Color;
use sketchsync_core::element::{Element, Properties};
use sketchsync_core::geometry::{self, Metrics};
use sketchsync_core::selection::{HANDLE_SIZE, SELECTION_PADDING};

/// Length of an arrowhead stroke in world units.
pub const ARROW_HEAD_LENGTH: f64 = 15.0;
/// Half-spread of an arrowhead in world units.
pub const ARROW_HEAD_SPREAD: f64 = 6.0;
/// Font size for text elements in world units.
pub const FONT_SIZE: f64 = 16.0;

/// A single drawing operation in screen space.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Clear(Color),
    Fill { path: BezPath, color: Color },
    Stroke { path: BezPath, color: Color, width: f64 },
    /// Text centered on `center`.
    Text { text: String, center: Point, size: f64, color: Color },
    Image { src: String, rect: Rect },
}

/// Builds a flat list of draw commands for a frame.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    commands: Vec<DrawCommand>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands of the last built frame.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Take ownership of the commands (resets internal list).
    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Build a frame, refusing contexts that cannot produce a sensible image.
    pub fn render(&mut self, ctx: &RenderContext) -> RenderResult<Vec<DrawCommand>> {
        let size = ctx.viewport_size;
        if !(size.width > 0.0 && size.height > 0.0) {
            return Err(RendererError::RenderFailed(format!("empty viewport {}x{}", size.width, size.height)));
        }
        if !(ctx.camera.zoom.is_finite() && ctx.camera.zoom > 0.0) {
            return Err(RendererError::RenderFailed(format!("invalid zoom {}", ctx.camera.zoom)));
        }
        self.build_scene(ctx);
        Ok(self.take_commands())
    }

    fn stroke(&mut self, path: BezPath, color: Color, width: f64) {
        self.commands.push(DrawCommand::Stroke { path, color, width });
    }

    fn fill(&mut self, path: BezPath, color: Color) {
        self.commands.push(DrawCommand::Fill { path, color });
    }

    /// Draw an element's geometry. `color` overrides the stroke color.
    fn render_properties(&mut self, properties: &Properties, transform: Affine, zoom: f64, color: Option<Color>) {
        let style = properties.style();
        let stroke_color = color.unwrap_or_else(|| style.stroke_color());
        let width = f64::from(style.stroke_width) * zoom;

        match properties {
            Properties::Rect { x, y, width: w, height: h, .. } => {
                let path = transform * Rect::new(*x, *y, x + w, y + h).to_path(0.1);
                if let Some(fill) = style.fill_color() {
                    self.fill(path.clone(), fill);
                }
                self.stroke(path, stroke_color, width);
            }
            Properties::Arrow { x, y, x2, y2, .. } => {
                let (tail, head) = (Point::new(*x, *y), Point::new(*x2, *y2));
                self.stroke(transform * arrow_path(tail, head), stroke_color, width);
            }
            Properties::Text { x, y, text, .. } => {
                self.commands.push(DrawCommand::Text {
                    text: text.clone(),
                    center: transform * Point::new(*x, *y),
                    size: FONT_SIZE * zoom,
                    color: stroke_color,
                });
            }
            Properties::Image { x, y, width: w, height: h, src, .. } => {
                let rect = transform.transform_rect_bbox(Rect::new(*x, *y, x + w, y + h));
                self.commands.push(DrawCommand::Image { src: src.clone(), rect });
            }
        }
    }

    /// Outline and handles for the selected element.
    fn render_selection(&mut self, element: &Element, transform: Affine, metrics: &Metrics, color: Color) {
        let properties = &element.properties;
        let half = HANDLE_SIZE / 2.0;
        // Padding and handles are in screen space, so they do not scale with zoom
        let outline = || {
            transform
                .transform_rect_bbox(geometry::bounds(properties, metrics))
                .inflate(SELECTION_PADDING, SELECTION_PADDING)
        };

        let handles: Vec<Point> = match properties {
            Properties::Arrow { x, y, x2, y2, .. } => {
                vec![transform * Point::new(*x, *y), transform * Point::new(*x2, *y2)]
            }
            Properties::Text { .. } => {
                self.stroke(outline().to_path(0.1), color, 1.0);
                Vec::new()
            }
            Properties::Rect { .. } | Properties::Image { .. } => {
                let outline = outline();
                self.stroke(outline.to_path(0.1), color, 1.0);
                vec![
                    Point::new(outline.x0, outline.y0),
                    Point::new(outline.x1, outline.y0),
                    Point::new(outline.x0, outline.y1),
                    Point::new(outline.x1, outline.y1),
                ]
            }
        };

        for center in handles {
            let path = Rect::new(center.x - half, center.y - half, center.x + half, center.y + half).to_path(0.1);
            self.fill(path.clone(), Color::WHITE);
            self.stroke(path, color, 1.0);
        }
    }

    /// Draw a remote user's cursor at a screen position.
    ///
    /// The cursor is rendered as a small pointer triangle with the peer's color.
    pub fn draw_cursor(&mut self, screen_pos: Point, color: Color) {
        let mut path = BezPath::new();
        path.move_to(screen_pos);
        path.line_to(screen_pos + Vec2::new(0.0, 18.0));
        path.line_to(screen_pos + Vec2::new(14.0, 14.0));
        path.close_path();

        self.fill(path.clone(), color);
        // White stroke for visibility against any background
        self.stroke(path, Color::WHITE, 1.5);
    }
}

/// Shaft plus a two-segment chevron at the head.
pub fn arrow_path(tail: Point, head: Point) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(tail);
    path.line_to(head);

    let angle = (head - tail).atan2();
    let rotate = Affine::translate(head.to_vec2()) * Affine::rotate(angle);
    for spread in [ARROW_HEAD_SPREAD, -ARROW_HEAD_SPREAD] {
        path.move_to(head);
        path.line_to(rotate * Point::new(-ARROW_HEAD_LENGTH, spread));
    }
    path
}

/// Stable color for a peer id.
pub fn peer_color(peer_id: &str) -> Color {
    const PALETTE: [(u8, u8, u8); 6] = [
        (239, 68, 68),
        (245, 158, 11),
        (16, 185, 129),
        (59, 130, 246),
        (139, 92, 246),
        (236, 72, 153),
    ];
    let hash = peer_id.bytes().fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    let (r, g, b) = PALETTE[hash as usize % PALETTE.len()];
    Color::from_rgba8(r, g, b, 255)
}

impl Renderer for SceneBuilder {
    fn build_scene(&mut self, ctx: &RenderContext) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear(self.background_color(ctx)));

        let transform = ctx.camera.transform();
        let zoom = ctx.camera.zoom;

        for element in ctx.elements {
            if ctx.editing == Some(element.id) {
                continue;
            }
            self.render_properties(&element.properties, transform, zoom, None);
        }

        let selected = ctx
            .selected
            .filter(|id| ctx.editing != Some(*id))
            .and_then(|id| ctx.elements.iter().find(|e| e.id == id));
        if let Some(element) = selected {
            self.render_selection(element, transform, &ctx.metrics, ctx.selection_color);
        }

        if let Some(preview) = ctx.preview {
            self.render_properties(preview, transform, zoom, Some(ctx.preview_color));
        }

        if let Some(cursors) = ctx.cursors {
            let mut peers: Vec<_> = cursors.iter().collect();
            peers.sort_by(|a, b| a.0.cmp(b.0));
            for (peer_id, position) in peers {
                let screen = ctx.camera.world_to_screen(Point::new(position.x, position.y));
                self.draw_cursor(screen, peer_color(peer_id));
            }
        }
        log::trace!("Built scene with {} commands", self.commands.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{PathEl, Size};
    use sketchsync_core::sync::CursorPosition;
    use sketchsync_core::{Camera, Element, Properties, Style};
    use std::collections::HashMap;

    fn viewport() -> Size {
        Size::new(800.0, 600.0)
    }

    fn rgba(color: Color) -> (u8, u8, u8, u8) {
        let c = color.to_rgba8();
        (c.r, c.g, c.b, c.a)
    }

    fn strokes(commands: &[DrawCommand]) -> Vec<(&BezPath, Color, f64)> {
        commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Stroke { path, color, width } => Some((path, *color, *width)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_scene_clears() {
        let camera = Camera::new();
        let ctx = RenderContext::new(&[], &camera, viewport());
        let commands = SceneBuilder::new().render(&ctx).unwrap();
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], DrawCommand::Clear(c) if rgba(c) == (255, 255, 255, 255)));
    }

    #[test]
    fn test_empty_viewport_is_an_error() {
        let camera = Camera::new();
        let ctx = RenderContext::new(&[], &camera, Size::ZERO);
        assert!(matches!(SceneBuilder::new().render(&ctx), Err(RendererError::RenderFailed(_))));
    }

    #[test]
    fn test_rect_defaults_black_no_fill() {
        let camera = Camera::new();
        let elements = vec![Element::new("c", Properties::rect(10.0, 10.0, 20.0, 20.0))];
        let ctx = RenderContext::new(&elements, &camera, viewport());
        let commands = SceneBuilder::new().render(&ctx).unwrap();

        assert!(!commands.iter().any(|c| matches!(c, DrawCommand::Fill { .. })));
        let strokes = strokes(&commands);
        assert_eq!(strokes.len(), 1);
        assert_eq!(rgba(strokes[0].1), (0, 0, 0, 255));
        assert!((strokes[0].2 - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_transparent_fill_is_skipped() {
        let camera = Camera::new();
        let mut props = Properties::rect(0.0, 0.0, 5.0, 5.0);
        *props.style_mut() = Style { fill: Some("transparent".into()), ..Style::default() };
        let mut filled = Properties::rect(0.0, 0.0, 5.0, 5.0);
        filled.style_mut().fill = Some("#ff0000".into());

        let elements = vec![Element::new("c", props), Element::new("c", filled)];
        let ctx = RenderContext::new(&elements, &camera, viewport());
        let commands = SceneBuilder::new().render(&ctx).unwrap();
        let fills: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Fill { color, .. } => Some(rgba(*color)),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![(255, 0, 0, 255)]);
    }

    #[test]
    fn test_arrow_head_geometry() {
        let path = arrow_path(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let points: Vec<Point> = path
            .elements()
            .iter()
            .filter_map(|el| match el {
                PathEl::LineTo(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(points.len(), 3);
        assert!((points[1] - Point::new(85.0, 6.0)).hypot() < 1e-9);
        assert!((points[2] - Point::new(85.0, -6.0)).hypot() < 1e-9);
    }

    #[test]
    fn test_camera_applied_to_commands() {
        let mut camera = Camera::new();
        camera.zoom_to(Point::ZERO, 2.0);
        camera.pan(Vec2::new(10.0, 0.0));
        let elements = vec![Element::new("c", Properties::text(5.0, 5.0, "hi"))];
        let ctx = RenderContext::new(&elements, &camera, viewport());
        let commands = SceneBuilder::new().render(&ctx).unwrap();

        match &commands[1] {
            DrawCommand::Text { text, center, size, .. } => {
                assert_eq!(text, "hi");
                assert_eq!(*center, Point::new(20.0, 10.0));
                assert!((size - 32.0).abs() < f64::EPSILON);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_editing_element_is_skipped() {
        let camera = Camera::new();
        let element = Element::new("c", Properties::text(0.0, 0.0, "draft"));
        let id = element.id;
        let elements = vec![element];
        let ctx = RenderContext::new(&elements, &camera, viewport())
            .with_editing(Some(id))
            .with_selected(Some(id));
        let commands = SceneBuilder::new().render(&ctx).unwrap();
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn test_selection_outline_and_handles() {
        let camera = Camera::new();
        let element = Element::new("c", Properties::rect(10.0, 10.0, 20.0, 20.0));
        let id = element.id;
        let elements = vec![element];
        let ctx = RenderContext::new(&elements, &camera, viewport()).with_selected(Some(id));
        let commands = SceneBuilder::new().render(&ctx).unwrap();

        let blue: Vec<_> = strokes(&commands)
            .into_iter()
            .filter(|(_, color, _)| rgba(*color) == (59, 130, 246, 255))
            .collect();
        // Outline plus four handles
        assert_eq!(blue.len(), 5);
        let outline = blue[0].0.bounding_box();
        assert_eq!(outline, Rect::new(6.0, 6.0, 34.0, 34.0));
        let handle = blue[1].0.bounding_box();
        assert_eq!(handle, Rect::new(2.0, 2.0, 10.0, 10.0));
    }

    #[test]
    fn test_selection_padding_ignores_zoom() {
        let mut camera = Camera::new();
        camera.zoom_to(Point::ZERO, 5.0);
        let element = Element::new("c", Properties::rect(10.0, 10.0, 20.0, 20.0));
        let id = element.id;
        let elements = vec![element];
        let ctx = RenderContext::new(&elements, &camera, viewport()).with_selected(Some(id));
        let commands = SceneBuilder::new().render(&ctx).unwrap();

        let blue: Vec<_> = strokes(&commands)
            .into_iter()
            .filter(|(_, color, _)| rgba(*color) == (59, 130, 246, 255))
            .collect();
        // Rect spans 50..150 on screen; outline sits 4px outside it
        assert_eq!(blue[0].0.bounding_box(), Rect::new(46.0, 46.0, 154.0, 154.0));
        assert_eq!(blue[1].0.bounding_box(), Rect::new(42.0, 42.0, 50.0, 50.0));
    }

    #[test]
    fn test_selected_text_has_no_handles() {
        let camera = Camera::new();
        let element = Element::new("c", Properties::text(0.0, 0.0, "ab"));
        let id = element.id;
        let elements = vec![element];
        let ctx = RenderContext::new(&elements, &camera, viewport()).with_selected(Some(id));
        let commands = SceneBuilder::new().render(&ctx).unwrap();
        assert_eq!(strokes(&commands).len(), 1);
    }

    #[test]
    fn test_preview_in_blue() {
        let camera = Camera::new();
        let preview = Properties::arrow(0.0, 0.0, 10.0, 10.0);
        let ctx = RenderContext::new(&[], &camera, viewport()).with_preview(Some(&preview));
        let commands = SceneBuilder::new().render(&ctx).unwrap();
        let strokes = strokes(&commands);
        assert_eq!(strokes.len(), 1);
        assert_eq!(rgba(strokes[0].1), (0, 0, 255, 255));
    }

    #[test]
    fn test_cursors_in_screen_space() {
        let mut camera = Camera::new();
        camera.pan(Vec2::new(100.0, 50.0));
        let mut cursors = HashMap::new();
        cursors.insert("bob".to_string(), CursorPosition { x: 10.0, y: 10.0 });
        let ctx = RenderContext::new(&[], &camera, viewport()).with_cursors(&cursors);
        let commands = SceneBuilder::new().render(&ctx).unwrap();

        let fill = commands.iter().find_map(|c| match c {
            DrawCommand::Fill { path, color } => Some((path.bounding_box(), *color)),
            _ => None,
        });
        let (bounds, color) = fill.unwrap();
        assert_eq!(bounds.origin(), Point::new(110.0, 60.0));
        assert_eq!(rgba(color), rgba(peer_color("bob")));
    }
}
