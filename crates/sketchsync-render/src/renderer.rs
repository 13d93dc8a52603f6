//! Renderer trait abstraction.

use kurbo::Size;
use peniko::Color;
use sketchsync_core::element::{Element, ElementId, Properties};
use sketchsync_core::geometry::Metrics;
use sketchsync_core::sync::CursorPosition;
use sketchsync_core::{Camera, Editor};
use std::collections::HashMap;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// Elements in paint order (back to front).
    pub elements: &'a [Element],
    pub camera: &'a Camera,
    /// Viewport size in pixels.
    pub viewport_size: Size,
    /// In-progress draw shape.
    pub preview: Option<&'a Properties>,
    pub selected: Option<ElementId>,
    /// Element being edited as text (skipped in build_scene).
    pub editing: Option<ElementId>,
    /// Remote cursors keyed by peer id, in world coordinates.
    pub cursors: Option<&'a HashMap<String, CursorPosition>>,
    pub background_color: Color,
    /// Selection highlight color.
    pub selection_color: Color,
    /// Color of the preview shape.
    pub preview_color: Color,
    /// Text measurement shared with hit testing.
    pub metrics: Metrics,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(elements: &'a [Element], camera: &'a Camera, viewport_size: Size) -> Self {
        Self {
            elements,
            camera,
            viewport_size,
            preview: None,
            selected: None,
            editing: None,
            cursors: None,
            background_color: Color::from_rgba8(255, 255, 255, 255),
            selection_color: Color::from_rgba8(59, 130, 246, 255), // #3b82f6
            preview_color: Color::from_rgba8(0, 0, 255, 255),
            metrics: Metrics::default(),
        }
    }

    /// Context for everything the editor currently shows.
    pub fn from_editor(editor: &'a Editor, viewport_size: Size) -> Self {
        Self::new(editor.store().elements(), editor.camera(), viewport_size)
            .with_preview(editor.preview())
            .with_selected(editor.selected())
            .with_editing(editor.editing())
            .with_metrics(editor.config().metrics())
    }

    pub fn with_preview(mut self, preview: Option<&'a Properties>) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_selected(mut self, id: Option<ElementId>) -> Self {
        self.selected = id;
        self
    }

    /// Set the element being edited (will be skipped in build_scene).
    pub fn with_editing(mut self, id: Option<ElementId>) -> Self {
        self.editing = id;
        self
    }

    pub fn with_cursors(mut self, cursors: &'a HashMap<String, CursorPosition>) -> Self {
        self.cursors = Some(cursors);
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Build the scene/command buffer for a frame.
    ///
    /// This method is called once per frame and should prepare all drawing commands.
    fn build_scene(&mut self, ctx: &RenderContext);

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}
