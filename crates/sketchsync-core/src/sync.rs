//! Wire protocol between clients and the relay server.
//!
//! Messages are JSON objects tagged by `"type"`:
//! ```json
//! { "type": "join", "canvas_id": "c1" }
//! { "type": "insert", "write_id": 3, "element": { ... } }
//! { "type": "cursor", "x": 100, "y": 200 }
//! ```

use crate::element::{CanvasId, Element, ElementId, Properties};
use crate::store::{PendingWrite, WriteId, WriteRequest};
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a canvas and receive its elements
    Join { canvas_id: CanvasId },
    /// Leave the current canvas
    Leave,
    Insert { write_id: WriteId, element: Element },
    InsertBatch { write_id: WriteId, elements: Vec<Element> },
    /// Replace an element's properties (always the full object)
    Update { write_id: WriteId, id: ElementId, properties: Properties },
    Delete { write_id: WriteId, id: ElementId },
    /// Ephemeral cursor position in world coordinates
    Cursor { x: f64, y: f64 },
}

impl From<PendingWrite> for ClientMessage {
    fn from(write: PendingWrite) -> Self {
        let write_id = write.write_id;
        match write.request {
            WriteRequest::Insert(element) => ClientMessage::Insert { write_id, element },
            WriteRequest::InsertBatch(elements) => ClientMessage::InsertBatch { write_id, elements },
            WriteRequest::Update { id, properties } => ClientMessage::Update { write_id, id, properties },
            WriteRequest::Delete { id } => ClientMessage::Delete { write_id, id },
        }
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm the join with the canvas contents
    Joined {
        canvas_id: CanvasId,
        /// Id the server assigned to this connection
        peer_id: String,
        elements: Vec<Element>,
        /// Other peers already on the canvas
        #[serde(default)]
        peers: Vec<String>,
    },
    /// The requested canvas does not exist
    NotFound { canvas_id: CanvasId },
    /// A write was persisted
    Ack { write_id: WriteId },
    /// A write was refused
    Rejected { write_id: WriteId, reason: String },
    /// A persisted change on the canvas (including our own)
    Change { event: ChangeEvent },
    /// Cursor position of a peer
    Cursor { peer_id: String, x: f64, y: f64 },
    /// Peer joined the canvas
    PeerJoined { peer_id: String },
    /// Peer left the canvas
    PeerLeft { peer_id: String },
    /// Error message
    Error { message: String },
}

/// A change to the persisted element list of one canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert { element: Element },
    Update { element: Element },
    Delete { canvas_id: CanvasId, id: ElementId },
}

impl ChangeEvent {
    /// Canvas the change applies to.
    pub fn canvas_id(&self) -> &str {
        match self {
            ChangeEvent::Insert { element } | ChangeEvent::Update { element } => &element.canvas_id,
            ChangeEvent::Delete { canvas_id, .. } => canvas_id,
        }
    }
}

/// Last known cursor position of a remote peer, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events reported by the sync client after handling a server message
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Joined a canvas; the store now holds its elements
    Joined { canvas_id: CanvasId, peer_id: String, element_count: usize },
    /// The canvas does not exist
    CanvasNotFound { canvas_id: CanvasId },
    /// A pending write was confirmed
    WriteConfirmed { write_id: WriteId },
    /// A pending write was rejected and rolled back
    WriteRolledBack { write_id: WriteId, reason: String },
    /// A remote change altered the store
    ElementsChanged,
    /// A peer's cursor moved
    CursorMoved { peer_id: String, position: CursorPosition },
    /// A peer joined the canvas
    PeerJoined { peer_id: String },
    /// A peer left the canvas
    PeerLeft { peer_id: String },
    /// Error reported by the server
    Error { message: String },
}
