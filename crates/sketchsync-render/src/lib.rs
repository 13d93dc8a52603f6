//! SketchSync Render Library
//!
//! Renderer abstraction and a display-list scene builder for SketchSync.

mod renderer;
pub mod scene;

pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};
pub use scene::{DrawCommand, SceneBuilder};
