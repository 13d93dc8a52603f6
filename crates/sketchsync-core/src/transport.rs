//! Message transports for the sync client.
//!
//! A transport moves text frames to and from the relay server. Delivery is
//! polled from the event loop with [`Transport::poll_events`], so nothing
//! here ever blocks the caller.

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Events from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connected to server
    Connected,
    /// A text frame arrived
    Message(String),
    /// Disconnected from server
    Disconnected,
    /// Error occurred
    Error(String),
}

/// A bidirectional text channel to the relay server.
pub trait Transport {
    /// Queue a text frame for sending.
    fn send(&mut self, msg: &str) -> Result<(), SyncError>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

/// In-memory transport for testing and embedding.
///
/// Frames passed to `send` are collected in `sent`; events pushed with
/// `deliver` are returned by the next `poll_events`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<String>,
    inbox: Vec<TransportEvent>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next poll.
    pub fn deliver(&mut self, event: TransportEvent) {
        self.inbox.push(event);
    }

    /// Queue a text frame for the next poll.
    pub fn deliver_text(&mut self, text: impl Into<String>) {
        self.deliver(TransportEvent::Message(text.into()));
    }

    /// Take everything sent so far.
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    /// Make subsequent sends fail.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, msg: &str) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::NotConnected);
        }
        self.sent.push(msg.to_string());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.inbox)
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use crate::sync::ConnectionState;
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{connect, Message};
    use url::Url;

    /// First 100 characters of a frame, for logging.
    fn preview(msg: &str) -> &str {
        let end = msg.char_indices().nth(100).map(|(i, _)| i).unwrap_or(msg.len());
        &msg[..end]
    }

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<TransportEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a WebSocket server.
        pub fn connect(&mut self, url: &str) -> Result<(), SyncError> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::AlreadyConnected);
            }

            let parsed_url = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    parsed_url.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();

            let url = url.to_string();

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url);

                let (mut socket, response) = match connect(&url) {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let _ = event_tx.send(TransportEvent::Error(format!("Connection failed: {}", e)));
                        return;
                    }
                };

                log::info!("WebSocket connected, status: {}", response.status());
                let _ = event_tx.send(TransportEvent::Connected);

                // Short read timeout so the loop can service outgoing commands
                if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }

                loop {
                    match cmd_rx.try_recv() {
                        Ok(WsCommand::Send(msg)) => {
                            log::debug!("WebSocket sending: {}", preview(&msg));
                            if let Err(e) = socket.send(Message::Text(msg)) {
                                log::error!("WebSocket send error: {}", e);
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Ok(WsCommand::Close) => {
                            log::info!("WebSocket close requested");
                            let _ = socket.close(None);
                            break;
                        }
                        Err(TryRecvError::Disconnected) => {
                            log::info!("WebSocket command channel disconnected");
                            break;
                        }
                        Err(TryRecvError::Empty) => {}
                    }

                    match socket.read() {
                        Ok(Message::Text(txt)) => {
                            log::debug!("WebSocket received: {}", preview(&txt));
                            let _ = event_tx.send(TransportEvent::Message(txt));
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = socket.send(Message::Pong(data));
                        }
                        Ok(Message::Close(_)) => {
                            log::info!("WebSocket received close frame");
                            break;
                        }
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(ref e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            log::error!("WebSocket read error: {}", e);
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }

                log::info!("WebSocket thread exiting");
                let _ = event_tx.send(TransportEvent::Disconnected);
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);

            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Get current connection state.
        pub fn state(&self) -> ConnectionState {
            self.state
        }

        /// Check if connected.
        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Transport for NativeWebSocket {
        fn send(&mut self, msg: &str) -> Result<(), SyncError> {
            match self.cmd_tx {
                Some(ref tx) => tx
                    .send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| SyncError::Send(e.to_string())),
                None => Err(SyncError::NotConnected),
            }
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            let mut events = Vec::new();
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        TransportEvent::Connected => self.state = ConnectionState::Connected,
                        TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        TransportEvent::Error(_) => self.state = ConnectionState::Error,
                        TransportEvent::Message(_) => {}
                    }
                    events.push(event);
                }
            }
            events
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_rejects_non_websocket_scheme() {
            let mut ws = NativeWebSocket::new();
            assert!(matches!(ws.connect("http://localhost:3030/ws"), Err(SyncError::InvalidUrl(_))));
            assert!(matches!(ws.connect("not a url"), Err(SyncError::InvalidUrl(_))));
            assert_eq!(ws.state(), ConnectionState::Disconnected);
        }

        #[test]
        fn test_send_before_connect() {
            let mut ws = NativeWebSocket::new();
            assert_eq!(ws.send("{}"), Err(SyncError::NotConnected));
            assert!(ws.poll_events().is_empty());
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;
