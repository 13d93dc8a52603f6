//! Drawing tools.

use crate::element::ElementKind;
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Select,
    Rectangle,
    Arrow,
    Text,
    Image,
}

impl ToolKind {
    /// All tools in toolbar order.
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Select,
        ToolKind::Rectangle,
        ToolKind::Arrow,
        ToolKind::Text,
        ToolKind::Image,
    ];

    /// Digit key that selects this tool, '1' through '5' in toolbar order.
    pub fn shortcut(self) -> char {
        let index = match self {
            ToolKind::Select => 0,
            ToolKind::Rectangle => 1,
            ToolKind::Arrow => 2,
            ToolKind::Text => 3,
            ToolKind::Image => 4,
        };
        char::from(b'1' + index)
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Select => "select",
            ToolKind::Rectangle => "rectangle",
            ToolKind::Arrow => "arrow",
            ToolKind::Text => "text",
            ToolKind::Image => "image",
        }
    }

    /// Element kind created by dragging with this tool, if any.
    pub fn drawn_kind(self) -> Option<ElementKind> {
        match self {
            ToolKind::Rectangle => Some(ElementKind::Rect),
            ToolKind::Arrow => Some(ElementKind::Arrow),
            _ => None,
        }
    }
}
