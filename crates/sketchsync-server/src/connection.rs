//! Per-connection protocol handling, independent of the socket.

use crate::rooms::{AppState, CanvasRoom, Envelope};
use sketchsync_core::sync::{ChangeEvent, ClientMessage, ServerMessage};
use sketchsync_core::store::WriteId;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// State of one client connection.
pub struct Connection {
    peer_id: String,
    canvas: Option<String>,
    rx: Option<broadcast::Receiver<Envelope>>,
}

impl Connection {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            canvas: None,
            rx: None,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn canvas(&self) -> Option<&str> {
        self.canvas.as_deref()
    }

    /// Receiver for the joined canvas, if any.
    pub fn receiver(&mut self) -> Option<&mut broadcast::Receiver<Envelope>> {
        self.rx.as_mut()
    }

    /// Whether a broadcast envelope should reach this connection.
    pub fn should_deliver(&self, envelope: &Envelope) -> bool {
        envelope.echo || envelope.from != self.peer_id
    }

    /// Apply a client message. Returns the replies for this connection only;
    /// anything meant for the room goes out through the broadcast channel.
    pub fn handle_client_message(&mut self, state: &AppState, message: ClientMessage) -> Vec<ServerMessage> {
        match message {
            ClientMessage::Join { canvas_id } => self.join(state, canvas_id),
            ClientMessage::Leave => {
                self.leave(state);
                Vec::new()
            }
            ClientMessage::Insert { write_id, element } => self.write(state, write_id, |room, canvas| room.insert(canvas, element)),
            ClientMessage::InsertBatch { write_id, elements } => {
                self.write(state, write_id, |room, canvas| room.insert_batch(canvas, elements))
            }
            ClientMessage::Update { write_id, id, properties } => {
                self.write(state, write_id, |room, _| room.update(id, properties))
            }
            ClientMessage::Delete { write_id, id } => self.write(state, write_id, |room, canvas| Ok(room.delete(canvas, id))),
            ClientMessage::Cursor { x, y } => {
                if let Some(canvas) = &self.canvas {
                    state.broadcast(
                        canvas,
                        Envelope {
                            from: self.peer_id.clone(),
                            echo: false,
                            message: ServerMessage::Cursor {
                                peer_id: self.peer_id.clone(),
                                x,
                                y,
                            },
                        },
                    );
                }
                Vec::new()
            }
        }
    }

    fn join(&mut self, state: &AppState, canvas_id: String) -> Vec<ServerMessage> {
        self.leave(state);

        let Some(joined) = state.join(&canvas_id, &self.peer_id) else {
            info!("Peer {} asked for unknown canvas {}", self.peer_id, canvas_id);
            return vec![ServerMessage::NotFound { canvas_id }];
        };

        self.rx = Some(joined.rx);
        self.canvas = Some(canvas_id.clone());
        state.broadcast(
            &canvas_id,
            Envelope {
                from: self.peer_id.clone(),
                echo: false,
                message: ServerMessage::PeerJoined {
                    peer_id: self.peer_id.clone(),
                },
            },
        );
        info!(
            "Peer {} joined canvas {} ({} elements)",
            self.peer_id,
            canvas_id,
            joined.elements.len()
        );

        vec![ServerMessage::Joined {
            canvas_id,
            peer_id: self.peer_id.clone(),
            elements: joined.elements,
            peers: joined.peers,
        }]
    }

    fn leave(&mut self, state: &AppState) {
        self.rx = None;
        let Some(canvas) = self.canvas.take() else {
            return;
        };
        state.leave(&canvas, &self.peer_id);
        state.broadcast(
            &canvas,
            Envelope {
                from: self.peer_id.clone(),
                echo: false,
                message: ServerMessage::PeerLeft {
                    peer_id: self.peer_id.clone(),
                },
            },
        );
        info!("Peer {} left canvas {}", self.peer_id, canvas);
    }

    fn write(
        &self,
        state: &AppState,
        write_id: WriteId,
        mutate: impl FnOnce(&mut CanvasRoom, &str) -> Result<Vec<ChangeEvent>, String>,
    ) -> Vec<ServerMessage> {
        let Some(canvas) = &self.canvas else {
            return vec![ServerMessage::Rejected {
                write_id,
                reason: "not joined".to_string(),
            }];
        };

        match state.write(canvas, &self.peer_id, |room| mutate(room, canvas.as_str())) {
            Ok(()) => {
                debug!("Write {} from {} accepted", write_id, self.peer_id);
                vec![ServerMessage::Ack { write_id }]
            }
            Err(reason) => {
                warn!("Write {} from {} rejected: {}", write_id, self.peer_id, reason);
                vec![ServerMessage::Rejected { write_id, reason }]
            }
        }
    }

    /// Recover from a lagged receiver: subscribe again and resend the whole
    /// canvas, since the missed changes cannot be replayed.
    pub fn resync(&mut self, state: &AppState) -> Vec<ServerMessage> {
        let Some(canvas_id) = self.canvas.clone() else {
            return Vec::new();
        };
        match state.resubscribe(&canvas_id, &self.peer_id) {
            Some(snapshot) => {
                info!("Resending canvas {} to {}", canvas_id, self.peer_id);
                self.rx = Some(snapshot.rx);
                vec![ServerMessage::Joined {
                    canvas_id,
                    peer_id: self.peer_id.clone(),
                    elements: snapshot.elements,
                    peers: snapshot.peers,
                }]
            }
            None => {
                self.rx = None;
                self.canvas = None;
                vec![ServerMessage::NotFound { canvas_id }]
            }
        }
    }

    /// Release the connection's place on its canvas.
    pub fn disconnect(&mut self, state: &AppState) {
        self.leave(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use sketchsync_core::element::{Element, ElementId, Properties};

    fn state(auto_create: bool) -> AppState {
        AppState::new(&ServerConfig {
            auto_create,
            canvases: vec!["known".to_string()],
            ..ServerConfig::default()
        })
    }

    fn join(conn: &mut Connection, state: &AppState, canvas: &str) -> Vec<ServerMessage> {
        conn.handle_client_message(state, ClientMessage::Join { canvas_id: canvas.into() })
    }

    fn drain(conn: &mut Connection) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Some(Ok(envelope)) = conn.receiver().map(|rx| rx.try_recv()) {
            if conn.should_deliver(&envelope) {
                out.push(envelope.message);
            }
        }
        out
    }

    #[test]
    fn test_join_replies_with_contents() {
        let state = state(true);
        let mut conn = Connection::new("p1");
        let replies = join(&mut conn, &state, "known");
        assert_eq!(
            replies,
            vec![ServerMessage::Joined {
                canvas_id: "known".into(),
                peer_id: "p1".into(),
                elements: vec![],
                peers: vec![],
            }]
        );
        assert_eq!(conn.canvas(), Some("known"));
    }

    #[test]
    fn test_join_unknown_canvas() {
        let state = state(false);
        let mut conn = Connection::new("p1");
        let replies = join(&mut conn, &state, "missing");
        assert_eq!(replies, vec![ServerMessage::NotFound { canvas_id: "missing".into() }]);
        assert_eq!(conn.canvas(), None);
    }

    #[test]
    fn test_write_before_join_is_rejected() {
        let state = state(true);
        let mut conn = Connection::new("p1");
        let write_id: WriteId = 7;
        let replies = conn.handle_client_message(
            &state,
            ClientMessage::Delete {
                write_id,
                id: ElementId::new_v4(),
            },
        );
        assert_eq!(
            replies,
            vec![ServerMessage::Rejected {
                write_id,
                reason: "not joined".into()
            }]
        );
    }

    #[test]
    fn test_insert_is_acked_and_echoed_to_everyone() {
        let state = state(true);
        let mut alice = Connection::new("alice");
        let mut bob = Connection::new("bob");
        join(&mut alice, &state, "known");
        join(&mut bob, &state, "known");
        drain(&mut alice);
        drain(&mut bob);

        let element = Element::new("known", Properties::rect(0.0, 0.0, 10.0, 10.0));
        let write_id: WriteId = 7;
        let replies = alice.handle_client_message(
            &state,
            ClientMessage::Insert {
                write_id,
                element: element.clone(),
            },
        );
        assert_eq!(replies, vec![ServerMessage::Ack { write_id }]);

        let change = ServerMessage::Change {
            event: ChangeEvent::Insert { element },
        };
        assert_eq!(drain(&mut alice), vec![change.clone()]);
        assert_eq!(drain(&mut bob), vec![change]);
    }

    #[test]
    fn test_presence_is_not_echoed() {
        let state = state(true);
        let mut alice = Connection::new("alice");
        let mut bob = Connection::new("bob");
        join(&mut alice, &state, "known");
        let replies = join(&mut bob, &state, "known");
        assert!(matches!(&replies[0], ServerMessage::Joined { peers, .. } if peers == &vec!["alice".to_string()]));

        assert_eq!(drain(&mut alice), vec![ServerMessage::PeerJoined { peer_id: "bob".into() }]);
        assert!(drain(&mut bob).is_empty());

        bob.handle_client_message(&state, ClientMessage::Cursor { x: 1.0, y: 2.0 });
        assert_eq!(
            drain(&mut alice),
            vec![ServerMessage::Cursor {
                peer_id: "bob".into(),
                x: 1.0,
                y: 2.0
            }]
        );
        assert!(drain(&mut bob).is_empty());

        bob.disconnect(&state);
        assert_eq!(drain(&mut alice), vec![ServerMessage::PeerLeft { peer_id: "bob".into() }]);
    }

    #[test]
    fn test_rejected_update_keeps_room_unchanged() {
        let state = state(true);
        let mut conn = Connection::new("p1");
        join(&mut conn, &state, "known");
        let write_id: WriteId = 7;
        let replies = conn.handle_client_message(
            &state,
            ClientMessage::Update {
                write_id,
                id: ElementId::new_v4(),
                properties: Properties::rect(0.0, 0.0, 1.0, 1.0),
            },
        );
        assert!(matches!(&replies[..], [ServerMessage::Rejected { write_id: w, .. }] if *w == write_id));
        assert!(drain(&mut conn).is_empty());
    }

    #[test]
    fn test_lagged_peer_is_resynced() {
        let state = state(true);
        let mut writer = Connection::new("writer");
        let mut slow = Connection::new("slow");
        join(&mut writer, &state, "known");
        join(&mut slow, &state, "known");
        drain(&mut writer);
        drain(&mut slow);

        for i in 0..=crate::rooms::CHANNEL_CAPACITY {
            let element = Element::new("known", Properties::rect(i as f64, 0.0, 1.0, 1.0));
            writer.handle_client_message(&state, ClientMessage::Insert { write_id: i as WriteId, element });
        }
        let lagged = slow.receiver().map(|rx| rx.try_recv());
        assert!(matches!(lagged, Some(Err(broadcast::error::TryRecvError::Lagged(_)))));

        let replies = slow.resync(&state);
        match &replies[..] {
            [ServerMessage::Joined { elements, peers, .. }] => {
                assert_eq!(elements.len(), crate::rooms::CHANNEL_CAPACITY + 1);
                assert_eq!(peers, &vec!["writer".to_string()]);
            }
            other => panic!("expected a fresh snapshot, got {other:?}"),
        }
        // Nothing stale is replayed after the snapshot
        assert!(drain(&mut slow).is_empty());

        let element = Element::new("known", Properties::rect(-1.0, 0.0, 1.0, 1.0));
        writer.handle_client_message(&state, ClientMessage::Insert { write_id: 999, element: element.clone() });
        assert_eq!(
            drain(&mut slow),
            vec![ServerMessage::Change { event: ChangeEvent::Insert { element } }]
        );
    }

    #[test]
    fn test_rejoin_moves_between_canvases() {
        let state = state(true);
        let mut watcher = Connection::new("watcher");
        let mut conn = Connection::new("p1");
        join(&mut watcher, &state, "known");
        join(&mut conn, &state, "known");
        drain(&mut watcher);

        join(&mut conn, &state, "other");
        assert_eq!(conn.canvas(), Some("other"));
        assert_eq!(drain(&mut watcher), vec![ServerMessage::PeerLeft { peer_id: "p1".into() }]);
    }
}
