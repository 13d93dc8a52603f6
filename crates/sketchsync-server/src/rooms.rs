//! Canvas rooms: the element list of each canvas plus its connected peers.

use crate::config::ServerConfig;
use dashmap::DashMap;
use sketchsync_core::element::{Element, ElementId, Properties};
use sketchsync_core::sync::{ChangeEvent, ServerMessage};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of each room's broadcast channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// A message fanned out to every connection in a room.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Peer that caused the message.
    pub from: String,
    /// Deliver to the originating peer as well.
    pub echo: bool,
    pub message: ServerMessage,
}

/// State of one canvas.
pub struct CanvasRoom {
    tx: broadcast::Sender<Envelope>,
    peers: HashSet<String>,
    elements: Vec<Element>,
    /// Created on first join rather than configured up front.
    auto_created: bool,
}

impl CanvasRoom {
    pub fn new(auto_created: bool) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            elements: Vec::new(),
            auto_created,
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether the room can be dropped from memory.
    fn is_disposable(&self) -> bool {
        self.auto_created && self.peers.is_empty() && self.elements.is_empty()
    }

    fn contains(&self, id: ElementId) -> bool {
        self.elements.iter().any(|e| e.id == id)
    }

    fn check_new(&self, canvas_id: &str, element: &Element) -> Result<(), String> {
        if element.canvas_id != canvas_id {
            return Err(format!("element {} belongs to canvas {}", element.id, element.canvas_id));
        }
        if self.contains(element.id) {
            return Err(format!("element {} already exists", element.id));
        }
        Ok(())
    }

    pub fn insert(&mut self, canvas_id: &str, element: Element) -> Result<Vec<ChangeEvent>, String> {
        self.check_new(canvas_id, &element)?;
        self.elements.push(element.clone());
        Ok(vec![ChangeEvent::Insert { element }])
    }

    /// Insert all elements or none.
    pub fn insert_batch(&mut self, canvas_id: &str, elements: Vec<Element>) -> Result<Vec<ChangeEvent>, String> {
        let mut seen = HashSet::new();
        for element in &elements {
            self.check_new(canvas_id, element)?;
            if !seen.insert(element.id) {
                return Err(format!("element {} appears twice in batch", element.id));
            }
        }
        self.elements.extend(elements.iter().cloned());
        Ok(elements.into_iter().map(|element| ChangeEvent::Insert { element }).collect())
    }

    pub fn update(&mut self, id: ElementId, properties: Properties) -> Result<Vec<ChangeEvent>, String> {
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| format!("element {} not found", id))?;
        if element.kind() != properties.kind() {
            return Err(format!(
                "cannot change element kind from {} to {}",
                element.kind().name(),
                properties.kind().name()
            ));
        }
        element.properties = properties;
        Ok(vec![ChangeEvent::Update { element: element.clone() }])
    }

    /// Remove an element. Deleting a missing element succeeds without a change.
    pub fn delete(&mut self, canvas_id: &str, id: ElementId) -> Vec<ChangeEvent> {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        if self.elements.len() == before {
            debug!("Delete of missing element {} on {}", id, canvas_id);
            return Vec::new();
        }
        vec![ChangeEvent::Delete { canvas_id: canvas_id.to_string(), id }]
    }
}

/// What a peer receives on joining a canvas.
pub struct JoinedRoom {
    pub rx: broadcast::Receiver<Envelope>,
    pub elements: Vec<Element>,
    /// Peers that were already present.
    pub peers: Vec<String>,
}

/// Shared application state
pub struct AppState {
    rooms: DashMap<String, CanvasRoom>,
    auto_create: bool,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let rooms = DashMap::new();
        for canvas_id in &config.canvases {
            rooms.insert(canvas_id.clone(), CanvasRoom::new(false));
        }
        Self {
            rooms,
            auto_create: config.auto_create,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn has_room(&self, canvas_id: &str) -> bool {
        self.rooms.contains_key(canvas_id)
    }

    /// Add a peer to a canvas. Returns `None` if the canvas does not exist
    /// and may not be created.
    pub fn join(&self, canvas_id: &str, peer_id: &str) -> Option<JoinedRoom> {
        let mut room = match self.rooms.get_mut(canvas_id) {
            Some(room) => room,
            None if self.auto_create => {
                info!("Creating canvas {}", canvas_id);
                self.rooms
                    .entry(canvas_id.to_string())
                    .or_insert_with(|| CanvasRoom::new(true))
            }
            None => return None,
        };
        let mut peers: Vec<String> = room.peers.iter().cloned().collect();
        peers.sort();
        room.peers.insert(peer_id.to_string());
        Some(JoinedRoom {
            rx: room.tx.subscribe(),
            elements: room.elements.clone(),
            peers,
        })
    }

    /// A fresh subscription and a matching snapshot of the room, for a peer
    /// whose receiver fell behind. Writes hold the room exclusively while
    /// broadcasting, so nothing can slip between the two.
    pub fn resubscribe(&self, canvas_id: &str, peer_id: &str) -> Option<JoinedRoom> {
        let room = self.rooms.get(canvas_id)?;
        let mut peers: Vec<String> = room.peers.iter().filter(|p| *p != peer_id).cloned().collect();
        peers.sort();
        Some(JoinedRoom {
            rx: room.tx.subscribe(),
            elements: room.elements.clone(),
            peers,
        })
    }

    /// Remove a peer from a canvas, dropping the room if nothing is left in it.
    pub fn leave(&self, canvas_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(canvas_id) {
            room.peers.remove(peer_id);
            if room.is_disposable() {
                drop(room);
                self.rooms.remove_if(canvas_id, |_, room| room.is_disposable());
                debug!("Dropped empty canvas {}", canvas_id);
            }
        }
    }

    /// Broadcast a message to a room.
    pub fn broadcast(&self, canvas_id: &str, envelope: Envelope) {
        if let Some(room) = self.rooms.get(canvas_id) {
            // No subscribers is fine
            let _ = room.tx.send(envelope);
        }
    }

    /// Run a mutation on a room and broadcast the resulting changes to
    /// every peer, the writer included.
    pub fn write(
        &self,
        canvas_id: &str,
        peer_id: &str,
        mutate: impl FnOnce(&mut CanvasRoom) -> Result<Vec<ChangeEvent>, String>,
    ) -> Result<(), String> {
        let mut room = self
            .rooms
            .get_mut(canvas_id)
            .ok_or_else(|| format!("canvas {} not found", canvas_id))?;
        let changes = mutate(&mut *room)?;
        for event in changes {
            let _ = room.tx.send(Envelope {
                from: peer_id.to_string(),
                echo: true,
                message: ServerMessage::Change { event },
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auto_create: bool, canvases: &[&str]) -> ServerConfig {
        ServerConfig {
            auto_create,
            canvases: canvases.iter().map(|c| c.to_string()).collect(),
            ..ServerConfig::default()
        }
    }

    fn rect(canvas: &str) -> Element {
        Element::new(canvas, Properties::rect(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_insert_rules() {
        let mut room = CanvasRoom::new(true);
        let el = rect("c1");
        assert_eq!(room.insert("c1", el.clone()).unwrap().len(), 1);
        assert!(room.insert("c1", el).unwrap_err().contains("already exists"));
        assert!(room.insert("c1", rect("other")).unwrap_err().contains("belongs to canvas"));
        assert_eq!(room.elements().len(), 1);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut room = CanvasRoom::new(true);
        let existing = rect("c1");
        room.insert("c1", existing.clone()).unwrap();

        let result = room.insert_batch("c1", vec![rect("c1"), existing]);
        assert!(result.is_err());
        assert_eq!(room.elements().len(), 1);

        let dup = rect("c1");
        assert!(room.insert_batch("c1", vec![dup.clone(), dup]).is_err());

        let changes = room.insert_batch("c1", vec![rect("c1"), rect("c1")]).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(room.elements().len(), 3);
    }

    #[test]
    fn test_update_rules() {
        let mut room = CanvasRoom::new(true);
        let el = rect("c1");
        let id = el.id;
        room.insert("c1", el).unwrap();

        let changes = room.update(id, Properties::rect(5.0, 5.0, 1.0, 1.0)).unwrap();
        match &changes[0] {
            ChangeEvent::Update { element } => assert_eq!(element.properties, Properties::rect(5.0, 5.0, 1.0, 1.0)),
            other => panic!("expected update, got {other:?}"),
        }
        assert!(room.update(id, Properties::text(0.0, 0.0, "x")).unwrap_err().contains("kind"));
        assert!(room.update(ElementId::new_v4(), Properties::rect(0.0, 0.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut room = CanvasRoom::new(true);
        let el = rect("c1");
        let id = el.id;
        room.insert("c1", el).unwrap();
        assert_eq!(room.delete("c1", id).len(), 1);
        assert!(room.delete("c1", id).is_empty());
    }

    #[test]
    fn test_join_unknown_canvas_without_auto_create() {
        let state = AppState::new(&config(false, &["known"]));
        assert!(state.join("unknown", "p1").is_none());
        assert!(state.join("known", "p1").is_some());
    }

    #[test]
    fn test_join_lists_existing_peers() {
        let state = AppState::new(&config(true, &[]));
        let first = state.join("c1", "p1").unwrap();
        assert!(first.peers.is_empty());
        let second = state.join("c1", "p2").unwrap();
        assert_eq!(second.peers, vec!["p1".to_string()]);
    }

    #[test]
    fn test_room_lifecycle() {
        let state = AppState::new(&config(true, &["fixed"]));

        // Auto-created and empty: dropped on last leave
        state.join("temp", "p1").unwrap();
        state.leave("temp", "p1");
        assert!(!state.has_room("temp"));

        // Auto-created with content: kept
        state.join("kept", "p1").unwrap();
        state.write("kept", "p1", |room| room.insert("kept", rect("kept"))).unwrap();
        state.leave("kept", "p1");
        assert!(state.has_room("kept"));

        // Configured: kept even when empty
        state.join("fixed", "p1").unwrap();
        state.leave("fixed", "p1");
        assert!(state.has_room("fixed"));
    }

    #[tokio::test]
    async fn test_write_broadcasts_with_echo() {
        let state = AppState::new(&config(true, &[]));
        let mut joined = state.join("c1", "p1").unwrap();
        let el = rect("c1");

        state.write("c1", "p1", |room| room.insert("c1", el.clone())).unwrap();
        let envelope = joined.rx.recv().await.unwrap();
        assert_eq!(envelope.from, "p1");
        assert!(envelope.echo);
        assert_eq!(envelope.message, ServerMessage::Change { event: ChangeEvent::Insert { element: el } });
    }

    #[tokio::test]
    async fn test_rejected_write_broadcasts_nothing() {
        let state = AppState::new(&config(true, &[]));
        let mut joined = state.join("c1", "p1").unwrap();
        let result = state.write("c1", "p1", |room| room.update(ElementId::new_v4(), Properties::text(0.0, 0.0, "x")));
        assert!(result.is_err());
        assert!(matches!(joined.rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }
}
