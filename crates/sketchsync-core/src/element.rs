//! Element definitions for the shared canvas.

use kurbo::{Point, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Identifier of the canvas an element belongs to.
pub type CanvasId = String;

/// Default stroke width applied when none is stored.
pub const DEFAULT_STROKE_WIDTH: u32 = 2;

fn default_stroke_width() -> u32 {
    DEFAULT_STROKE_WIDTH
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Style attributes shared by every element kind.
///
/// Colors are kept as CSS strings so they survive a round trip through
/// remote storage unchanged. Use [`Style::stroke_color`] and
/// [`Style::fill_color`] to resolve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Stroke color (absent = renderer default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Fill color ("transparent" or absent = no fill).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Stroke width in world units.
    #[serde(default = "default_stroke_width", rename = "strokeWidth")]
    pub stroke_width: u32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke: None,
            fill: None,
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

impl Style {
    /// Resolve the stroke color, falling back to black.
    pub fn stroke_color(&self) -> Color {
        self.stroke
            .as_deref()
            .and_then(parse_color)
            .unwrap_or(Color::from_rgba8(0, 0, 0, 255))
    }

    /// Resolve the fill color. `None` means the shape is not filled.
    pub fn fill_color(&self) -> Option<Color> {
        self.fill.as_deref().and_then(parse_color)
    }

    /// Merge a partial style into this one.
    pub fn apply_patch(&mut self, patch: &StylePatch) {
        if let Some(stroke) = &patch.stroke {
            self.stroke = Some(stroke.clone());
        }
        if let Some(fill) = &patch.fill {
            self.fill = Some(fill.clone());
        }
        if let Some(width) = patch.stroke_width {
            self.stroke_width = width.max(1);
        }
    }
}

/// Partial style update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, rename = "strokeWidth", skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<u32>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        self.stroke.is_none() && self.fill.is_none() && self.stroke_width.is_none()
    }
}

/// The kind of an element. Fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Rect,
    Arrow,
    Text,
    Image,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Rect => "rect",
            ElementKind::Arrow => "arrow",
            ElementKind::Text => "text",
            ElementKind::Image => "image",
        }
    }
}

/// Geometry and style of an element, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Properties {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(flatten)]
        style: Style,
    },
    /// Directed segment: tail at (x, y), head at (x2, y2).
    Arrow {
        x: f64,
        y: f64,
        x2: f64,
        y2: f64,
        #[serde(flatten)]
        style: Style,
    },
    /// (x, y) is the visual center of the text.
    Text {
        x: f64,
        y: f64,
        text: String,
        #[serde(flatten)]
        style: Style,
    },
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        src: String,
        #[serde(flatten)]
        style: Style,
    },
}

impl Properties {
    /// Rectangle with default style.
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Properties::Rect { x, y, width, height, style: Style::default() }
    }

    /// Arrow with default style.
    pub fn arrow(x: f64, y: f64, x2: f64, y2: f64) -> Self {
        Properties::Arrow { x, y, x2, y2, style: Style::default() }
    }

    /// Text centered on (x, y) with default style.
    pub fn text(x: f64, y: f64, text: impl Into<String>) -> Self {
        Properties::Text { x, y, text: text.into(), style: Style::default() }
    }

    /// Image with default style.
    pub fn image(x: f64, y: f64, width: f64, height: f64, src: impl Into<String>) -> Self {
        Properties::Image { x, y, width, height, src: src.into(), style: Style::default() }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Properties::Rect { .. } => ElementKind::Rect,
            Properties::Arrow { .. } => ElementKind::Arrow,
            Properties::Text { .. } => ElementKind::Text,
            Properties::Image { .. } => ElementKind::Image,
        }
    }

    pub fn style(&self) -> &Style {
        match self {
            Properties::Rect { style, .. }
            | Properties::Arrow { style, .. }
            | Properties::Text { style, .. }
            | Properties::Image { style, .. } => style,
        }
    }

    pub fn style_mut(&mut self) -> &mut Style {
        match self {
            Properties::Rect { style, .. }
            | Properties::Arrow { style, .. }
            | Properties::Text { style, .. }
            | Properties::Image { style, .. } => style,
        }
    }

    /// The (x, y) anchor every kind carries.
    pub fn origin(&self) -> Point {
        match self {
            Properties::Rect { x, y, .. }
            | Properties::Arrow { x, y, .. }
            | Properties::Text { x, y, .. }
            | Properties::Image { x, y, .. } => Point::new(*x, *y),
        }
    }

    /// Shift every positional field (both endpoints for arrows).
    pub fn translate(&mut self, delta: Vec2) {
        match self {
            Properties::Rect { x, y, .. }
            | Properties::Text { x, y, .. }
            | Properties::Image { x, y, .. } => {
                *x += delta.x;
                *y += delta.y;
            }
            Properties::Arrow { x, y, x2, y2, .. } => {
                *x += delta.x;
                *y += delta.y;
                *x2 += delta.x;
                *y2 += delta.y;
            }
        }
    }

    /// Whether the shape has any extent. Used to discard click-without-drag draws.
    pub fn has_extent(&self) -> bool {
        match self {
            Properties::Rect { width, height, .. } | Properties::Image { width, height, .. } => {
                *width != 0.0 || *height != 0.0
            }
            Properties::Arrow { x, y, x2, y2, .. } => x != x2 || y != y2,
            Properties::Text { .. } => true,
        }
    }

    /// Merge a partial update. Fields that do not exist on this kind are ignored.
    pub fn apply_patch(&mut self, patch: &PropertiesPatch) {
        fn set(field: &mut f64, value: Option<f64>) {
            if let Some(v) = value {
                *field = v;
            }
        }

        match self {
            Properties::Rect { x, y, width, height, .. } => {
                set(x, patch.x);
                set(y, patch.y);
                set(width, patch.width);
                set(height, patch.height);
            }
            Properties::Arrow { x, y, x2, y2, .. } => {
                set(x, patch.x);
                set(y, patch.y);
                set(x2, patch.x2);
                set(y2, patch.y2);
            }
            Properties::Text { x, y, text, .. } => {
                set(x, patch.x);
                set(y, patch.y);
                if let Some(t) = &patch.text {
                    *text = t.clone();
                }
            }
            Properties::Image { x, y, width, height, src, .. } => {
                set(x, patch.x);
                set(y, patch.y);
                set(width, patch.width);
                set(height, patch.height);
                if let Some(s) = &patch.src {
                    *src = s.clone();
                }
            }
        }
        self.style_mut().apply_patch(&patch.style);
    }
}

/// Partial update of an element's properties. There is no way to change the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertiesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(flatten)]
    pub style: StylePatch,
}

impl PropertiesPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }

    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Default::default() }
    }

    pub fn style(style: StylePatch) -> Self {
        Self { style, ..Default::default() }
    }
}

/// A persisted element on a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub canvas_id: CanvasId,
    pub properties: Properties,
    /// Creation time in milliseconds since the Unix epoch. Informational only.
    #[serde(default)]
    pub created_at: u64,
}

impl Element {
    /// Create a new element with a fresh id.
    pub fn new(canvas_id: impl Into<CanvasId>, properties: Properties) -> Self {
        Self {
            id: Uuid::new_v4(),
            canvas_id: canvas_id.into(),
            properties,
            created_at: now_millis(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.properties.kind()
    }

    /// Clone this element under a new id, shifted by `offset` on both axes.
    pub fn duplicated(&self, offset: f64) -> Self {
        let mut properties = self.properties.clone();
        properties.translate(Vec2::new(offset, offset));
        Self {
            id: Uuid::new_v4(),
            canvas_id: self.canvas_id.clone(),
            properties,
            created_at: now_millis(),
        }
    }
}

/// Parse a CSS color string: `#rgb`, `#rrggbb`, `#rrggbbaa` or a basic named color.
/// Returns `None` for "transparent" and anything unrecognized.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    let (r, g, b) = match value.to_ascii_lowercase().as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "gray" | "grey" => (128, 128, 128),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, 255))
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 17;
            }
            Some(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255))
        }
        6 => Some(Color::from_rgba8(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        )),
        8 => Some(Color::from_rgba8(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            channel(&hex[6..8])?,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_json_shape() {
        let props = Properties::rect(10.0, 20.0, 30.0, 40.0);
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["type"], "rect");
        assert_eq!(json["width"], 30.0);
        assert_eq!(json["strokeWidth"], 2);
        assert!(json.get("stroke").is_none());
    }

    #[test]
    fn test_missing_stroke_width_defaults() {
        let json = r#"{"type":"arrow","x":0,"y":0,"x2":5,"y2":5,"stroke":"red"}"#;
        let props: Properties = serde_json::from_str(json).unwrap();
        assert_eq!(props.style().stroke_width, DEFAULT_STROKE_WIDTH);
        assert_eq!(props.style().stroke.as_deref(), Some("red"));
    }

    #[test]
    fn test_missing_geometry_is_rejected() {
        let json = r#"{"type":"rect","x":0,"y":0,"width":5}"#;
        assert!(serde_json::from_str::<Properties>(json).is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"ellipse","x":0,"y":0}"#;
        assert!(serde_json::from_str::<Properties>(json).is_err());
    }

    #[test]
    fn test_translate_arrow_moves_both_endpoints() {
        let mut props = Properties::arrow(0.0, 0.0, 10.0, 10.0);
        props.translate(Vec2::new(5.0, -5.0));
        assert_eq!(props, Properties::arrow(5.0, -5.0, 15.0, 5.0));
    }

    #[test]
    fn test_patch_ignores_foreign_fields() {
        let mut props = Properties::text(0.0, 0.0, "hi");
        props.apply_patch(&PropertiesPatch {
            width: Some(99.0),
            text: Some("hello".into()),
            ..Default::default()
        });
        assert_eq!(props, Properties::text(0.0, 0.0, "hello"));
    }

    #[test]
    fn test_patch_merges_style() {
        let mut props = Properties::rect(0.0, 0.0, 1.0, 1.0);
        props.apply_patch(&PropertiesPatch::style(StylePatch {
            fill: Some("#ef4444".into()),
            stroke_width: Some(4),
            ..Default::default()
        }));
        assert_eq!(props.style().fill.as_deref(), Some("#ef4444"));
        assert_eq!(props.style().stroke_width, 4);
        assert!(props.style().stroke.is_none());
    }

    #[test]
    fn test_has_extent() {
        assert!(!Properties::rect(5.0, 5.0, 0.0, 0.0).has_extent());
        assert!(Properties::rect(5.0, 5.0, 0.0, 3.0).has_extent());
        assert!(!Properties::arrow(1.0, 1.0, 1.0, 1.0).has_extent());
    }

    #[test]
    fn test_duplicated_gets_new_id_and_offset() {
        let el = Element::new("c1", Properties::rect(20.0, 20.0, 40.0, 40.0));
        let copy = el.duplicated(20.0);
        assert_ne!(el.id, copy.id);
        assert_eq!(copy.canvas_id, "c1");
        assert_eq!(copy.properties, Properties::rect(40.0, 40.0, 40.0, 40.0));
    }

    fn rgba(color: Color) -> (u8, u8, u8, u8) {
        let c = color.to_rgba8();
        (c.r, c.g, c.b, c.a)
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#3b82f6").map(rgba), Some((59, 130, 246, 255)));
        assert_eq!(parse_color("#fff").map(rgba), Some((255, 255, 255, 255)));
        assert_eq!(parse_color("black").map(rgba), Some((0, 0, 0, 255)));
        assert!(parse_color("transparent").is_none());
        assert!(parse_color("#12").is_none());
    }

    #[test]
    fn test_style_fallbacks() {
        let style = Style::default();
        assert_eq!(rgba(style.stroke_color()), (0, 0, 0, 255));
        assert!(style.fill_color().is_none());
    }
}
