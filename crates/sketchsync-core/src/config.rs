//! Editor configuration.

use crate::camera::{MAX_ZOOM, MIN_ZOOM};
use crate::geometry::{GLYPH_WIDTH, HIT_PADDING, LINE_HEIGHT, Metrics};
use crate::selection::HANDLE_HIT_TOLERANCE;
use crate::element::DEFAULT_STROKE_WIDTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the editor. Every field has a default, so a partial
/// JSON document is enough to override a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Padding around shapes for hit testing (world units).
    pub hit_padding: f64,
    /// Tolerance around resize handles (world units).
    pub handle_tolerance: f64,
    /// Average glyph width for text boxes.
    pub glyph_width: f64,
    /// Line height for text boxes.
    pub line_height: f64,
    /// Offset applied to pasted and duplicated elements.
    pub paste_offset: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Zoom change per unit of wheel delta when zooming.
    pub wheel_zoom_step: f64,
    /// Side length of newly placed images.
    pub image_size: f64,
    pub default_stroke_width: u32,
    /// Content of a freshly placed text element.
    pub text_placeholder: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            hit_padding: HIT_PADDING,
            handle_tolerance: HANDLE_HIT_TOLERANCE,
            glyph_width: GLYPH_WIDTH,
            line_height: LINE_HEIGHT,
            paste_offset: 20.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            wheel_zoom_step: 0.05,
            image_size: 200.0,
            default_stroke_width: DEFAULT_STROKE_WIDTH,
            text_placeholder: "Text".to_string(),
        }
    }
}

impl EditorConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject values the editor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("hit_padding", self.hit_padding),
            ("handle_tolerance", self.handle_tolerance),
            ("glyph_width", self.glyph_width),
            ("line_height", self.line_height),
            ("min_zoom", self.min_zoom),
            ("wheel_zoom_step", self.wheel_zoom_step),
            ("image_size", self.image_size),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.max_zoom.is_finite() && self.max_zoom >= self.min_zoom) {
            return Err(ConfigError::Invalid(format!(
                "max_zoom ({}) must not be below min_zoom ({})",
                self.max_zoom, self.min_zoom
            )));
        }
        if !self.paste_offset.is_finite() {
            return Err(ConfigError::Invalid("paste_offset must be finite".to_string()));
        }
        if self.default_stroke_width == 0 {
            return Err(ConfigError::Invalid("default_stroke_width must be positive".to_string()));
        }
        Ok(())
    }

    /// Hit-testing measurements derived from this config.
    pub fn metrics(&self) -> Metrics {
        Metrics {
            hit_padding: self.hit_padding,
            handle_tolerance: self.handle_tolerance,
            glyph_width: self.glyph_width,
            line_height: self.line_height,
        }
    }
}
