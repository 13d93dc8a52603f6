//! A collaborative editing session on one canvas.
//!
//! The session ties an [`Editor`] to a [`SyncClient`] and drives both from
//! a [`Transport`]. It owns the load lifecycle: the editor is only handed
//! out once the server has confirmed the join.

use crate::collaboration::SyncClient;
use crate::config::EditorConfig;
use crate::interaction::{Editor, Outbound};
use crate::sync::SyncEvent;
use crate::transport::{Transport, TransportEvent};
use thiserror::Error;

/// Why a session could not be loaded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Canvas not found: {0}")]
    CanvasNotFound(String),
    #[error("Failed to load canvas: {0}")]
    Load(String),
}

/// Load state of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// Waiting for the server to confirm the join.
    Loading,
    Ready,
    /// Terminal. Nothing more is processed.
    Failed(SessionError),
}

pub struct Session {
    editor: Editor,
    sync: SyncClient,
    status: SessionStatus,
}

impl Session {
    /// Start a session. The join request goes out on the first [`Session::pump`].
    pub fn new(canvas_id: &str, config: EditorConfig) -> Self {
        let mut sync = SyncClient::new();
        sync.join(canvas_id);
        Self {
            editor: Editor::new(canvas_id, config),
            sync,
            status: SessionStatus::Loading,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    /// The editor, once the canvas has loaded.
    pub fn editor(&self) -> Option<&Editor> {
        self.is_ready().then_some(&self.editor)
    }

    pub fn editor_mut(&mut self) -> Option<&mut Editor> {
        if self.is_ready() { Some(&mut self.editor) } else { None }
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    fn fail(&mut self, error: SessionError) {
        log::error!("Session failed: {}", error);
        self.status = SessionStatus::Failed(error);
    }

    /// Process everything the transport has received, then send everything
    /// queued locally. Returns the sync events observed.
    pub fn pump(&mut self, transport: &mut impl Transport) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        for event in transport.poll_events() {
            events.extend(self.handle_transport_event(event));
        }
        events.extend(self.flush(transport));
        events
    }

    /// Handle a single transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<SyncEvent> {
        if matches!(self.status, SessionStatus::Failed(_)) {
            log::debug!("Session failed; ignoring {:?}", event);
            return Vec::new();
        }

        match event {
            TransportEvent::Connected => {
                log::info!("Transport connected");
                Vec::new()
            }
            TransportEvent::Message(text) => self.handle_message(&text).into_iter().collect(),
            TransportEvent::Disconnected => self.transport_lost("disconnected".to_string()),
            TransportEvent::Error(e) => self.transport_lost(e),
        }
    }

    /// Before the canvas loads this is fatal. Afterwards no acks can arrive,
    /// so every unconfirmed write is rolled back.
    fn transport_lost(&mut self, reason: String) -> Vec<SyncEvent> {
        if self.status == SessionStatus::Loading {
            self.fail(SessionError::Load(reason));
            return Vec::new();
        }

        log::warn!("Transport lost: {}", reason);
        let undone = self.editor.store_mut().fail_pending(&reason);
        if undone.is_empty() {
            return Vec::new();
        }
        self.editor.reconcile_selection();
        undone
            .into_iter()
            .map(|write_id| SyncEvent::WriteRolledBack {
                write_id,
                reason: reason.clone(),
            })
            .collect()
    }

    fn handle_message(&mut self, text: &str) -> Option<SyncEvent> {
        let event = self.sync.handle_message(text, self.editor.store_mut())?;
        match &event {
            SyncEvent::Joined { element_count, .. } => {
                log::info!("Canvas ready with {} elements", element_count);
                self.status = SessionStatus::Ready;
                // A repeated join is a resync; drop references the snapshot lacks
                self.editor.reconcile_selection();
            }
            SyncEvent::CanvasNotFound { canvas_id } => {
                self.fail(SessionError::CanvasNotFound(canvas_id.clone()));
            }
            SyncEvent::ElementsChanged | SyncEvent::WriteRolledBack { .. } => {
                self.editor.reconcile_selection();
            }
            _ => {}
        }
        Some(event)
    }

    /// Hand queued editor output to the sync client and send all frames.
    ///
    /// A failed send drops the remaining frames and rolls back every
    /// unconfirmed write.
    pub fn flush(&mut self, transport: &mut impl Transport) -> Vec<SyncEvent> {
        if matches!(self.status, SessionStatus::Failed(_)) {
            return Vec::new();
        }
        if self.is_ready() {
            for outbound in self.editor.take_outbound() {
                match outbound {
                    Outbound::Write(write) => self.sync.send_write(write),
                    Outbound::Cursor { x, y } => self.sync.set_cursor(x, y),
                }
            }
        }
        for frame in self.sync.take_outgoing() {
            if let Err(e) = transport.send(&frame) {
                log::error!("Failed to send frame: {}", e);
                return self.transport_lost(e.to_string());
            }
        }
        Vec::new()
    }
}
