//! Sync client for real-time multi-user editing.
//!
//! The client turns local writes and cursor moves into outgoing JSON frames,
//! and reconciles inbound server messages against an [`ElementStore`]. It
//! knows nothing about how frames travel; see [`crate::transport`].

use std::collections::{BTreeSet, HashMap};

use crate::element::CanvasId;
use crate::store::{ElementStore, PendingWrite, WriteOutcome};
use crate::sync::{ClientMessage, CursorPosition, ServerMessage, SyncEvent};

/// Reconciles remote state and queues outgoing protocol messages.
#[derive(Debug, Default)]
pub struct SyncClient {
    /// Peer id the server assigned to us (known after join).
    peer_id: Option<String>,
    /// Current canvas (if joined).
    current_canvas: Option<CanvasId>,
    /// Last known cursor of each remote peer.
    cursors: HashMap<String, CursorPosition>,
    /// Remote peers on the canvas.
    peers: BTreeSet<String>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Our peer id, once the server has confirmed the join.
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    /// Get the current canvas id.
    pub fn current_canvas(&self) -> Option<&str> {
        self.current_canvas.as_deref()
    }

    /// Check if we're on a canvas.
    pub fn is_joined(&self) -> bool {
        self.current_canvas.is_some()
    }

    /// Remote cursors keyed by peer id.
    pub fn cursors(&self) -> &HashMap<String, CursorPosition> {
        &self.cursors
    }

    /// Remote peers currently on the canvas.
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to serialize {:?}: {}", msg, e),
        }
    }

    /// Request to join a canvas. Queues the join message.
    pub fn join(&mut self, canvas_id: &str) {
        self.queue(&ClientMessage::Join { canvas_id: canvas_id.to_string() });
    }

    /// Leave the current canvas. Queues the leave message.
    pub fn leave(&mut self) {
        if self.current_canvas.take().is_some() {
            self.queue(&ClientMessage::Leave);
            self.cursors.clear();
            self.peers.clear();
        }
    }

    /// Queue a locally applied write for the backend.
    pub fn send_write(&mut self, write: PendingWrite) {
        log::debug!("Queueing write {}", write.write_id);
        self.queue(&ClientMessage::from(write));
    }

    /// Broadcast our cursor position (world coordinates).
    ///
    /// Cursor frames are fire-and-forget and only sent while on a canvas.
    pub fn set_cursor(&mut self, x: f64, y: f64) {
        if self.is_joined() {
            self.queue(&ClientMessage::Cursor { x, y });
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Handle an incoming server message.
    ///
    /// Malformed messages are logged and dropped. Returns a [`SyncEvent`]
    /// when something observable happened.
    pub fn handle_message(&mut self, json: &str, store: &mut ElementStore) -> Option<SyncEvent> {
        let msg: ServerMessage = match serde_json::from_str(json) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Dropping malformed server message: {}", e);
                return None;
            }
        };
        self.handle_server_message(msg, store)
    }

    /// Handle an already decoded server message.
    pub fn handle_server_message(&mut self, msg: ServerMessage, store: &mut ElementStore) -> Option<SyncEvent> {
        match msg {
            ServerMessage::Joined { canvas_id, peer_id, elements, peers } => {
                if canvas_id != store.canvas_id() {
                    log::warn!("Joined unexpected canvas {}", canvas_id);
                    return None;
                }
                log::info!("Joined canvas {} as {}", canvas_id, peer_id);
                store.load(elements);
                self.cursors.clear();
                self.peers = peers.into_iter().filter(|p| *p != peer_id).collect();
                self.peer_id = Some(peer_id.clone());
                self.current_canvas = Some(canvas_id.clone());
                Some(SyncEvent::Joined { canvas_id, peer_id, element_count: store.len() })
            }
            ServerMessage::NotFound { canvas_id } => {
                log::warn!("Canvas {} not found", canvas_id);
                Some(SyncEvent::CanvasNotFound { canvas_id })
            }
            ServerMessage::Ack { write_id } => match store.complete(write_id, Ok(())) {
                WriteOutcome::Confirmed => Some(SyncEvent::WriteConfirmed { write_id }),
                _ => None,
            },
            ServerMessage::Rejected { write_id, reason } => match store.complete(write_id, Err(reason)) {
                WriteOutcome::RolledBack { reason } => Some(SyncEvent::WriteRolledBack { write_id, reason }),
                _ => None,
            },
            ServerMessage::Change { event } => {
                if store.apply_change(&event) {
                    Some(SyncEvent::ElementsChanged)
                } else {
                    None
                }
            }
            ServerMessage::Cursor { peer_id, x, y } => {
                if self.peer_id.as_deref() == Some(peer_id.as_str()) {
                    return None;
                }
                if !(x.is_finite() && y.is_finite()) {
                    log::warn!("Dropping cursor with non-finite position from {}", peer_id);
                    return None;
                }
                let position = CursorPosition { x, y };
                self.cursors.insert(peer_id.clone(), position);
                Some(SyncEvent::CursorMoved { peer_id, position })
            }
            ServerMessage::PeerJoined { peer_id } => {
                if self.peer_id.as_deref() == Some(peer_id.as_str()) {
                    return None;
                }
                self.peers.insert(peer_id.clone());
                Some(SyncEvent::PeerJoined { peer_id })
            }
            ServerMessage::PeerLeft { peer_id } => {
                self.peers.remove(&peer_id);
                self.cursors.remove(&peer_id);
                Some(SyncEvent::PeerLeft { peer_id })
            }
            ServerMessage::Error { message } => {
                log::warn!("Server error: {}", message);
                Some(SyncEvent::Error { message })
            }
        }
    }
}
