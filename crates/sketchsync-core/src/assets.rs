//! Binary asset upload for image elements.

use crate::element::{Element, Properties};
use crate::generate::{BoxFuture, ServiceError};
use kurbo::Point;

/// Uploads a binary asset and returns its public URL.
#[cfg(not(target_arch = "wasm32"))]
pub trait AssetUploader: Send + Sync {
    fn upload(&self, name: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<String, ServiceError>>;
}

/// Uploads a binary asset and returns its public URL (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait AssetUploader {
    fn upload(&self, name: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<String, ServiceError>>;
}

/// A square image element of side `size` centered on `center`.
pub fn image_element_at(src: impl Into<String>, center: Point, size: f64, canvas_id: &str) -> Element {
    let half = size / 2.0;
    Element::new(
        canvas_id,
        Properties::image(center.x - half, center.y - half, size, size, src),
    )
}
