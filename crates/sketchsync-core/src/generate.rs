//! Prompt-to-diagram generation.
//!
//! A [`DiagramGenerator`] turns a text prompt into shape descriptors laid
//! out around a local origin. [`place_descriptors`] moves them onto the
//! canvas and turns them into elements.

use crate::element::{CanvasId, Element, Properties, Style};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from external services (generator, asset upload).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("Generation failed: {0}")]
    Generation(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Boxed future for async collaborators (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A shape proposed by a generator, relative to a local origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescriptor {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(flatten)]
        style: Style,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        #[serde(flatten)]
        style: Style,
    },
    Arrow {
        x: f64,
        y: f64,
        x2: f64,
        y2: f64,
        #[serde(flatten)]
        style: Style,
    },
}

impl ShapeDescriptor {
    /// Element properties for this descriptor, shifted by `offset`.
    pub fn to_properties(&self, offset: Vec2) -> Properties {
        let mut properties = match self.clone() {
            ShapeDescriptor::Rect { x, y, width, height, style } => Properties::Rect { x, y, width, height, style },
            ShapeDescriptor::Text { x, y, text, style } => Properties::Text { x, y, text, style },
            ShapeDescriptor::Arrow { x, y, x2, y2, style } => Properties::Arrow { x, y, x2, y2, style },
        };
        properties.translate(offset);
        properties
    }
}

/// Parse a generator's JSON response (an array of descriptors).
pub fn parse_descriptors(json: &str) -> Result<Vec<ShapeDescriptor>, ServiceError> {
    serde_json::from_str(json).map_err(|e| ServiceError::Malformed(e.to_string()))
}

/// Turn descriptors into elements centered on `center`.
///
/// Every positional field, including arrow heads, is offset by the center.
pub fn place_descriptors(descriptors: &[ShapeDescriptor], center: Point, canvas_id: &str) -> Vec<Element> {
    let offset = center.to_vec2();
    descriptors
        .iter()
        .map(|d| Element::new(CanvasId::from(canvas_id), d.to_properties(offset)))
        .collect()
}

/// Generates diagrams from prompts.
#[cfg(not(target_arch = "wasm32"))]
pub trait DiagramGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<Vec<ShapeDescriptor>, ServiceError>>;
}

/// Generates diagrams from prompts (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait DiagramGenerator {
    fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<Vec<ShapeDescriptor>, ServiceError>>;
}
