//! SketchSync Core Library
//!
//! Platform-agnostic element model, interaction state machine and sync
//! client for the SketchSync collaborative canvas.

pub mod assets;
pub mod camera;
pub mod clipboard;
pub mod collaboration;
pub mod config;
pub mod element;
pub mod generate;
pub mod geometry;
pub mod input;
pub mod interaction;
pub mod selection;
pub mod session;
pub mod shortcuts;
pub mod store;
pub mod sync;
pub mod tools;
pub mod transport;

pub use assets::AssetUploader;
pub use camera::Camera;
pub use clipboard::Clipboard;
pub use collaboration::SyncClient;
pub use config::{ConfigError, EditorConfig};
pub use element::{CanvasId, Element, ElementId, ElementKind, Properties, PropertiesPatch, Style, StylePatch};
pub use generate::{DiagramGenerator, ServiceError, ShapeDescriptor};
pub use geometry::Metrics;
pub use input::{Key, KeyEvent, Modifiers, MouseButton, PointerEvent, WheelEvent};
pub use interaction::{DebugInfo, Editor, InteractionState, Outbound};
pub use selection::{Handle, HandleKind, ManipulationState};
pub use session::{Session, SessionError, SessionStatus};
pub use store::{ElementStore, PendingWrite, StoreError, WriteId, WriteOutcome, WriteRequest};
pub use sync::{ChangeEvent, ClientMessage, ConnectionState, CursorPosition, ServerMessage, SyncEvent};
pub use tools::ToolKind;
pub use transport::{MemoryTransport, SyncError, Transport, TransportEvent};

#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeWebSocket;
