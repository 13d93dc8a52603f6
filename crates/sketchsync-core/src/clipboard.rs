//! Process-local clipboard for elements.

use crate::element::Element;

/// Holds at most one copied element.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    content: Option<Element>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `element`, replacing any previous content.
    pub fn copy(&mut self, element: &Element) {
        self.content = Some(element.clone());
    }

    pub fn content(&self) -> Option<&Element> {
        self.content.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    /// A fresh clone of the copied element, shifted by `offset`.
    ///
    /// The clipboard keeps the original, so pasting twice lands both clones
    /// at the same place.
    pub fn paste(&self, offset: f64) -> Option<Element> {
        self.content.as_ref().map(|element| element.duplicated(offset))
    }
}
